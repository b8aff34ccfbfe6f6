//! Reading and writing framed messages on an async stream.
//!
//! The reader pulls the 6-byte header first, rejects oversize bodies before
//! allocating, then reads exactly the declared body and hands both to
//! [`decode_body`].

use deskshare_core::protocol::messages::{HEADER_SIZE, MAX_BODY_LEN};
use deskshare_core::{decode_body, encode_message, CodecError, FramingError, Message, MessageHeader};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Reading or writing one message failed.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Reads one complete message.
///
/// # Errors
///
/// [`StreamError::Closed`] on end of stream, [`StreamError::Codec`] for
/// malformed input, [`StreamError::Io`] otherwise.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, StreamError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; HEADER_SIZE];
    read_exact_or_closed(reader, &mut header_bytes).await?;
    let header = MessageHeader::from_bytes(&header_bytes);

    if header.length > MAX_BODY_LEN {
        return Err(CodecError::from(FramingError::Oversized {
            declared: header.length,
            max: MAX_BODY_LEN,
        })
        .into());
    }

    let mut body = vec![0u8; header.length as usize];
    read_exact_or_closed(reader, &mut body).await?;

    let msg = decode_body(&header, &body)?;
    trace!(kind = ?msg.message_type(), len = header.length, "message received");
    Ok(msg)
}

/// Encodes `msg` and writes it in one call.
///
/// # Errors
///
/// [`StreamError::Io`] if the write fails.
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<(), StreamError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(msg);
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!(kind = ?msg.message_type(), len = bytes.len(), "message sent");
    Ok(())
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), StreamError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(StreamError::Closed),
        Err(e) => Err(StreamError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskshare_core::protocol::messages::{MessageType, MouseMoveMessage};
    use deskshare_core::ProtocolError;

    #[tokio::test]
    async fn test_write_then_read_over_duplex() {
        // Arrange
        let (mut a, mut b) = tokio::io::duplex(256);
        let msg = Message::MouseMove(MouseMoveMessage { x: 12, y: 34 });

        // Act
        write_message(&mut a, &msg).await.unwrap();
        let received = read_message(&mut b).await.unwrap();

        // Assert
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn test_read_on_closed_stream_is_closed() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(matches!(read_message(&mut b).await, Err(StreamError::Closed)));
    }

    #[tokio::test]
    async fn test_oversized_header_is_rejected_before_body_is_read() {
        // Arrange: header only, declaring 1 MiB
        let (mut a, mut b) = tokio::io::duplex(64);
        let header = MessageHeader::new(MessageType::KeepAlive, 1 << 20).to_bytes();
        a.write_all(&header).await.unwrap();

        // Act
        let result = read_message(&mut b).await;

        // Assert
        assert!(matches!(
            result,
            Err(StreamError::Codec(CodecError::Framing(FramingError::Oversized { .. })))
        ));
    }

    #[tokio::test]
    async fn test_unknown_type_surfaces_as_protocol_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 0, 0, 0, 0x12, 0x34]).await.unwrap();
        assert!(matches!(
            read_message(&mut b).await,
            Err(StreamError::Codec(CodecError::Protocol(
                ProtocolError::UnknownMessageType(0x1234)
            )))
        ));
    }

    #[tokio::test]
    async fn test_body_cut_short_by_close_is_closed() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 0, 0, 4, 0, 6, 0, 1]).await.unwrap();
        drop(a);
        assert!(matches!(read_message(&mut b).await, Err(StreamError::Closed)));
    }
}
