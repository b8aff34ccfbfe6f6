//! Socket factory: how the connection obtains its byte stream.
//!
//! The connection state machine never opens sockets itself.  It asks a
//! [`SocketFactory`] for a connected stream, which lets tests substitute an
//! in-memory `tokio::io::duplex` pair for a real TCP socket.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A connected, bidirectional byte stream.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;

/// Opening the stream failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to connect to {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out connecting to {addr}")]
    Timeout { addr: String },
}

/// Produces connected streams for a server address.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// Connects to `addr` (`host:port`).
    ///
    /// # Errors
    ///
    /// [`ConnectError`] if no stream could be established.
    async fn connect(&self, addr: &str) -> Result<BoxedStream, ConnectError>;
}

/// The production factory: plain TCP with Nagle disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpSocketFactory;

#[async_trait]
impl SocketFactory for TcpSocketFactory {
    async fn connect(&self, addr: &str) -> Result<BoxedStream, ConnectError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConnectError::Io {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }
        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_factory_connects_to_listener() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accept = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            sock.read_exact(&mut buf).await.unwrap();
            buf
        });

        // Act
        let mut stream = TcpSocketFactory.connect(&addr).await.unwrap();
        stream.write_all(b"ping").await.unwrap();

        // Assert
        assert_eq!(&accept.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_tcp_factory_reports_refused_connection() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = TcpSocketFactory.connect(&addr).await;

        assert!(matches!(result, Err(ConnectError::Io { .. })));
    }
}
