//! Binary codec for encoding and decoding deskshare protocol messages.
//!
//! Wire format:
//! ```text
//! [length:4][type:2][body:length]
//! ```
//! All multi-byte integers are big-endian.  `length` counts body bytes only.
//!
//! Framing is uniform across kinds: the stream reader consumes the header,
//! then exactly `length` body bytes, and [`decode_body`] turns the pair into
//! one [`Message`].  Each kind's decoder must consume the declared body
//! exactly; a short body is [`FramingError::Truncated`] and leftover bytes are
//! [`FramingError::TrailingBytes`].

use crate::protocol::messages::{
    EnterMessage, HelloBackMessage, HelloMessage, IncompatibleMessage, KeyMessage,
    KeyRepeatMessage, Message, MessageHeader, MessageType, MouseButtonMessage, MouseMoveMessage,
    MouseWheelMessage, ScreenInfoMessage, HEADER_SIZE, MAX_BODY_LEN,
};
use thiserror::Error;

/// The byte stream cannot be split into a well-formed message.
///
/// Always fatal to the connection that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Fewer than [`HEADER_SIZE`] bytes were available for the header.
    #[error("incomplete header: need {HEADER_SIZE} bytes, got {available}")]
    IncompleteHeader { available: usize },

    /// The body holds fewer bytes than the kind requires.
    #[error("{kind:?} body truncated: need {needed} bytes, got {available}")]
    Truncated {
        kind: MessageType,
        needed: usize,
        available: usize,
    },

    /// The kind's decoder finished before the declared body ended.
    #[error("{kind:?} declared {declared} body bytes but only {consumed} were consumed")]
    TrailingBytes {
        kind: MessageType,
        declared: usize,
        consumed: usize,
    },

    /// The declared body length is above [`MAX_BODY_LEN`].
    #[error("declared body length {declared} exceeds the {max}-byte limit")]
    Oversized { declared: u32, max: u32 },
}

/// The bytes are well framed but do not make sense to the protocol.
///
/// Always fatal to the connection that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The type code is not a recognized message kind.
    #[error("unknown message type: 0x{0:04X}")]
    UnknownMessageType(u16),

    /// An ENTER arrived whose sequence number does not advance past the last one.
    #[error("out-of-sequence enter: last {last}, received {received}")]
    OutOfSequence { last: i32, received: i32 },

    /// A field holds a value outside its defined range.
    #[error("{kind:?}.{field} has invalid value {value}")]
    InvalidField {
        kind: MessageType,
        field: &'static str,
        value: u32,
    },

    /// A string field is not valid UTF-8.
    #[error("{kind:?} carries a string that is not valid UTF-8")]
    InvalidUtf8 { kind: MessageType },

    /// A valid message arrived in a connection phase where it is not allowed.
    #[error("unexpected {kind:?} while {phase}")]
    UnexpectedMessage {
        kind: MessageType,
        phase: &'static str,
    },
}

/// Either failure the decoder can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into its framed wire form (header + body).
///
/// # Examples
///
/// ```rust
/// use deskshare_core::protocol::{decode_message, encode_message, Message};
///
/// let bytes = encode_message(&Message::KeepAlive);
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, Message::KeepAlive);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let body = encode_body(msg);
    let header = MessageHeader::new(msg.message_type(), body.len() as u32);

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(&body);
    buf
}

/// Decodes one framed [`Message`] from the beginning of `bytes`.
///
/// Returns the message and the total number of bytes consumed (header +
/// body) so the caller can advance its cursor.  Bytes after the declared body
/// are never inspected.
///
/// # Errors
///
/// [`FramingError`] for short input, oversize or mis-sized bodies;
/// [`ProtocolError`] for unknown kinds and invalid field values.
///
/// # Examples
///
/// ```rust
/// use deskshare_core::protocol::{decode_message, EnterMessage, Message};
///
/// let bytes = [
///     0x00, 0x00, 0x00, 0x0A, 0x00, 0x01, // header: length 10, ENTER
///     0x00, 0x14, 0x00, 0x1E, 0x00, 0x00, 0x00, 0x05, 0x00, 0x03,
/// ];
/// let (msg, n) = decode_message(&bytes).unwrap();
/// assert_eq!(
///     msg,
///     Message::Enter(EnterMessage { x: 20, y: 30, sequence_number: 5, mask: 3 })
/// );
/// assert_eq!(n, 16);
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<(Message, usize), CodecError> {
    let header_bytes: &[u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or(FramingError::IncompleteHeader {
            available: bytes.len(),
        })?;
    let header = MessageHeader::from_bytes(header_bytes);
    let msg = decode_body(&header, &bytes[HEADER_SIZE..])?;
    Ok((msg, HEADER_SIZE + header.length as usize))
}

/// Decodes a message body whose header has already been read.
///
/// `body` must start at the first body byte.  Only the first
/// `header.length` bytes are looked at.
///
/// # Errors
///
/// See [`decode_message`].
pub fn decode_body(header: &MessageHeader, body: &[u8]) -> Result<Message, CodecError> {
    let kind = MessageType::try_from(header.type_code)
        .map_err(|_| ProtocolError::UnknownMessageType(header.type_code))?;

    if header.length > MAX_BODY_LEN {
        return Err(FramingError::Oversized {
            declared: header.length,
            max: MAX_BODY_LEN,
        }
        .into());
    }

    let declared = header.length as usize;
    if body.len() < declared {
        return Err(FramingError::Truncated {
            kind,
            needed: declared,
            available: body.len(),
        }
        .into());
    }
    let body = &body[..declared];

    if let Some(required) = kind.fixed_body_len() {
        if declared < required {
            return Err(FramingError::Truncated {
                kind,
                needed: required,
                available: declared,
            }
            .into());
        }
    }

    let mut reader = BodyReader::new(kind, body);
    let msg = match kind {
        MessageType::Enter => Message::Enter(EnterMessage {
            x: reader.read_i16()?,
            y: reader.read_i16()?,
            sequence_number: reader.read_i32()?,
            mask: reader.read_i16()?,
        }),
        MessageType::Leave => Message::Leave,
        MessageType::KeyDown => Message::KeyDown(read_key(&mut reader)?),
        MessageType::KeyUp => Message::KeyUp(read_key(&mut reader)?),
        MessageType::KeyRepeat => Message::KeyRepeat(KeyRepeatMessage {
            id: reader.read_u16()?,
            mask: reader.read_u16()?,
            count: reader.read_u16()?,
            button: reader.read_u16()?,
        }),
        MessageType::MouseMove => Message::MouseMove(MouseMoveMessage {
            x: reader.read_i16()?,
            y: reader.read_i16()?,
        }),
        MessageType::MouseButton => {
            let button = reader.read_u8()?;
            let pressed = match reader.read_u8()? {
                0 => false,
                1 => true,
                other => {
                    return Err(ProtocolError::InvalidField {
                        kind,
                        field: "state",
                        value: u32::from(other),
                    }
                    .into())
                }
            };
            Message::MouseButton(MouseButtonMessage { button, pressed })
        }
        MessageType::MouseWheel => Message::MouseWheel(MouseWheelMessage {
            x_delta: reader.read_i16()?,
            y_delta: reader.read_i16()?,
        }),
        MessageType::KeepAlive => Message::KeepAlive,
        MessageType::Close => Message::Close,
        MessageType::Hello => Message::Hello(HelloMessage {
            major: reader.read_u16()?,
            minor: reader.read_u16()?,
        }),
        MessageType::HelloBack => Message::HelloBack(HelloBackMessage {
            major: reader.read_u16()?,
            minor: reader.read_u16()?,
            name: reader.read_string()?,
        }),
        MessageType::QueryInfo => Message::QueryInfo,
        MessageType::ScreenInfo => Message::ScreenInfo(ScreenInfoMessage {
            x: reader.read_i16()?,
            y: reader.read_i16()?,
            width: reader.read_i16()?,
            height: reader.read_i16()?,
            warp_zone: reader.read_i16()?,
            mouse_x: reader.read_i16()?,
            mouse_y: reader.read_i16()?,
        }),
        MessageType::InfoAck => Message::InfoAck,
        MessageType::Incompatible => Message::Incompatible(IncompatibleMessage {
            major: reader.read_u16()?,
            minor: reader.read_u16()?,
        }),
        MessageType::Busy => Message::Busy,
        MessageType::UnknownClient => Message::UnknownClient,
        MessageType::BadProtocol => Message::BadProtocol,
    };
    reader.finish()?;
    Ok(msg)
}

fn read_key(reader: &mut BodyReader<'_>) -> Result<KeyMessage, CodecError> {
    Ok(KeyMessage {
        id: reader.read_u16()?,
        mask: reader.read_u16()?,
        button: reader.read_u16()?,
    })
}

// ── Body encoding ─────────────────────────────────────────────────────────────

fn encode_body(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        Message::Enter(m) => {
            buf.extend_from_slice(&m.x.to_be_bytes());
            buf.extend_from_slice(&m.y.to_be_bytes());
            buf.extend_from_slice(&m.sequence_number.to_be_bytes());
            buf.extend_from_slice(&m.mask.to_be_bytes());
        }
        Message::KeyDown(m) | Message::KeyUp(m) => {
            buf.extend_from_slice(&m.id.to_be_bytes());
            buf.extend_from_slice(&m.mask.to_be_bytes());
            buf.extend_from_slice(&m.button.to_be_bytes());
        }
        Message::KeyRepeat(m) => {
            buf.extend_from_slice(&m.id.to_be_bytes());
            buf.extend_from_slice(&m.mask.to_be_bytes());
            buf.extend_from_slice(&m.count.to_be_bytes());
            buf.extend_from_slice(&m.button.to_be_bytes());
        }
        Message::MouseMove(m) => {
            buf.extend_from_slice(&m.x.to_be_bytes());
            buf.extend_from_slice(&m.y.to_be_bytes());
        }
        Message::MouseButton(m) => {
            buf.push(m.button);
            buf.push(u8::from(m.pressed));
        }
        Message::MouseWheel(m) => {
            buf.extend_from_slice(&m.x_delta.to_be_bytes());
            buf.extend_from_slice(&m.y_delta.to_be_bytes());
        }
        Message::Hello(m) => {
            buf.extend_from_slice(&m.major.to_be_bytes());
            buf.extend_from_slice(&m.minor.to_be_bytes());
        }
        Message::HelloBack(m) => {
            buf.extend_from_slice(&m.major.to_be_bytes());
            buf.extend_from_slice(&m.minor.to_be_bytes());
            write_string(&mut buf, &m.name);
        }
        Message::ScreenInfo(m) => {
            for field in [m.x, m.y, m.width, m.height, m.warp_zone, m.mouse_x, m.mouse_y] {
                buf.extend_from_slice(&field.to_be_bytes());
            }
        }
        Message::Incompatible(m) => {
            buf.extend_from_slice(&m.major.to_be_bytes());
            buf.extend_from_slice(&m.minor.to_be_bytes());
        }
        Message::Leave
        | Message::KeepAlive
        | Message::Close
        | Message::QueryInfo
        | Message::InfoAck
        | Message::Busy
        | Message::UnknownClient
        | Message::BadProtocol => {} // empty body
    }
    buf
}

/// Writes a 4-byte length prefix followed by the UTF-8 string bytes.
fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

// ── Body cursor ───────────────────────────────────────────────────────────────

/// Big-endian cursor over one message body.
///
/// Never reads past the slice it was given, so a decoder cannot look ahead
/// into the next message.
struct BodyReader<'a> {
    kind: MessageType,
    body: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn new(kind: MessageType, body: &'a [u8]) -> Self {
        Self { kind, body, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FramingError> {
        let end = self.pos + n;
        let slice = self.body.get(self.pos..end).ok_or(FramingError::Truncated {
            kind: self.kind,
            needed: end,
            available: self.body.len(),
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], FramingError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, FramingError> {
        Ok(self.take_array::<1>()?[0])
    }

    fn read_u16(&mut self) -> Result<u16, FramingError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    fn read_i16(&mut self) -> Result<i16, FramingError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    fn read_u32(&mut self) -> Result<u32, FramingError> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    fn read_i32(&mut self) -> Result<i32, FramingError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    /// Reads a 4-byte length prefix and then that many UTF-8 bytes.
    fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::InvalidUtf8 { kind: self.kind })?;
        Ok(s.to_string())
    }

    /// Fails if the decoder left declared bytes unread.
    fn finish(self) -> Result<(), FramingError> {
        if self.pos == self.body.len() {
            Ok(())
        } else {
            Err(FramingError::TrailingBytes {
                kind: self.kind,
                declared: self.body.len(),
                consumed: self.pos,
            })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
