//! The HELLO / HELLOBACK exchange that opens every session.
//!
//! ```text
//! server                      client
//!   │── HELLO {major, minor} ───▶│   version check
//!   │◀── HELLOBACK {1, 6, name} ─│
//!   │── first message ──────────▶│   rejection → HandshakeError
//!                                    anything else → handshake complete
//! ```

use deskshare_core::protocol::messages::{
    HelloBackMessage, HelloMessage, Message, MessageType, PROTOCOL_MAJOR, PROTOCOL_MINOR,
    PROTOCOL_MINOR_MIN,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use super::framing::{read_message, write_message, StreamError};

/// The handshake did not produce a usable session.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The server speaks a protocol version this client does not accept, or
    /// rejected ours.
    #[error("incompatible protocol version {major}.{minor}")]
    IncompatibleVersion { major: u16, minor: u16 },
    #[error("server is busy")]
    ServerBusy,
    #[error("server does not recognize this client's name")]
    UnknownClient,
    #[error("server rejected the connection")]
    Rejected,
    #[error("handshake timed out")]
    Timeout,
    /// The server sent something other than HELLO first.
    #[error("expected HELLO, got {0:?}")]
    Unexpected(MessageType),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl HandshakeError {
    /// Whether reconnect branching applies.
    ///
    /// Version mismatch, unknown name and explicit rejection are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HandshakeError::IncompatibleVersion { .. }
                | HandshakeError::UnknownClient
                | HandshakeError::Rejected
        )
    }
}

/// Maps a server rejection to its error; `None` for non-rejections.
pub(super) fn rejection(msg: &Message) -> Option<HandshakeError> {
    match msg {
        Message::Incompatible(m) => Some(HandshakeError::IncompatibleVersion {
            major: m.major,
            minor: m.minor,
        }),
        Message::Busy => Some(HandshakeError::ServerBusy),
        Message::UnknownClient => Some(HandshakeError::UnknownClient),
        Message::BadProtocol => Some(HandshakeError::Rejected),
        _ => None,
    }
}

fn check_version(hello: &HelloMessage) -> Result<(), HandshakeError> {
    if hello.major != PROTOCOL_MAJOR || hello.minor < PROTOCOL_MINOR_MIN {
        return Err(HandshakeError::IncompatibleVersion {
            major: hello.major,
            minor: hello.minor,
        });
    }
    Ok(())
}

/// Runs the client side of the handshake.
///
/// Returns the server's first post-handshake message, which the caller must
/// process as the first streamed message.
///
/// # Errors
///
/// See [`HandshakeError`].  No timeout is applied here.
pub async fn perform<R, W>(
    reader: &mut R,
    writer: &mut W,
    client_name: &str,
) -> Result<Message, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let hello = match read_message(reader).await? {
        Message::Hello(hello) => hello,
        other => {
            return Err(rejection(&other)
                .unwrap_or_else(|| HandshakeError::Unexpected(other.message_type())))
        }
    };
    debug!(major = hello.major, minor = hello.minor, "server hello");
    check_version(&hello)?;

    write_message(
        writer,
        &Message::HelloBack(HelloBackMessage {
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR,
            name: client_name.to_string(),
        }),
    )
    .await?;

    let first = read_message(reader).await?;
    if let Some(err) = rejection(&first) {
        return Err(err);
    }
    info!(
        server_version = %format!("{}.{}", hello.major, hello.minor),
        "handshake complete"
    );
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskshare_core::protocol::messages::IncompatibleMessage;

    /// Server side of a scripted handshake: sends `hello`, reads HELLOBACK,
    /// sends `reply`.  Returns the HELLOBACK it received.
    async fn serve(
        mut server: tokio::io::DuplexStream,
        hello: Message,
        reply: Option<Message>,
    ) -> Option<Message> {
        write_message(&mut server, &hello).await.unwrap();
        let back = read_message(&mut server).await.ok();
        if let Some(reply) = reply {
            write_message(&mut server, &reply).await.unwrap();
        }
        back
    }

    async fn run(
        hello: Message,
        reply: Option<Message>,
    ) -> (Result<Message, HandshakeError>, Option<Message>) {
        let (client, server) = tokio::io::duplex(1024);
        let server_task = tokio::spawn(serve(server, hello, reply));
        let (mut r, mut w) = tokio::io::split(client);
        let result = perform(&mut r, &mut w, "laptop").await;
        drop((r, w));
        (result, server_task.await.unwrap())
    }

    #[tokio::test]
    async fn test_successful_handshake_returns_first_message() {
        // Act
        let (result, back) = run(
            Message::Hello(HelloMessage { major: 1, minor: 6 }),
            Some(Message::QueryInfo),
        )
        .await;

        // Assert
        assert_eq!(result.unwrap(), Message::QueryInfo);
        assert_eq!(
            back,
            Some(Message::HelloBack(HelloBackMessage {
                major: 1,
                minor: 6,
                name: "laptop".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn test_oldest_supported_minor_is_accepted() {
        let (result, _) = run(
            Message::Hello(HelloMessage { major: 1, minor: 3 }),
            Some(Message::KeepAlive),
        )
        .await;
        assert_eq!(result.unwrap(), Message::KeepAlive);
    }

    #[tokio::test]
    async fn test_old_minor_is_incompatible_and_no_helloback_is_sent() {
        let (result, back) = run(Message::Hello(HelloMessage { major: 1, minor: 2 }), None).await;
        assert!(matches!(
            result,
            Err(HandshakeError::IncompatibleVersion { major: 1, minor: 2 })
        ));
        assert_eq!(back, None);
    }

    #[tokio::test]
    async fn test_other_major_is_incompatible() {
        let (result, _) = run(Message::Hello(HelloMessage { major: 2, minor: 0 }), None).await;
        assert!(matches!(
            result,
            Err(HandshakeError::IncompatibleVersion { major: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_server_rejections_map_to_errors() {
        let cases = [
            (Message::Busy, "busy"),
            (Message::UnknownClient, "unknown"),
            (Message::BadProtocol, "rejected"),
            (
                Message::Incompatible(IncompatibleMessage { major: 1, minor: 8 }),
                "incompatible",
            ),
        ];
        for (reply, label) in cases {
            let (result, _) =
                run(Message::Hello(HelloMessage { major: 1, minor: 6 }), Some(reply)).await;
            let err = result.expect_err(label);
            match label {
                "busy" => assert!(matches!(err, HandshakeError::ServerBusy)),
                "unknown" => assert!(matches!(err, HandshakeError::UnknownClient)),
                "rejected" => assert!(matches!(err, HandshakeError::Rejected)),
                _ => assert!(matches!(err, HandshakeError::IncompatibleVersion { .. })),
            }
        }
    }

    #[tokio::test]
    async fn test_non_hello_opening_is_unexpected() {
        let (result, _) = run(Message::KeepAlive, None).await;
        assert!(matches!(
            result,
            Err(HandshakeError::Unexpected(MessageType::KeepAlive))
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(HandshakeError::ServerBusy.is_retryable());
        assert!(HandshakeError::Timeout.is_retryable());
        assert!(HandshakeError::Stream(StreamError::Closed).is_retryable());
        assert!(!HandshakeError::UnknownClient.is_retryable());
        assert!(!HandshakeError::Rejected.is_retryable());
        assert!(!HandshakeError::IncompatibleVersion { major: 2, minor: 0 }.is_retryable());
    }
}
