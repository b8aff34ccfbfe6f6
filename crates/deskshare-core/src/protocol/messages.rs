//! All deskshare protocol message types.
//!
//! Every message on the wire is a 6-byte header followed by a body:
//!
//! ```text
//! [length:4][type:2][body:length]
//! ```
//!
//! `length` counts the body bytes only.  The body layout is determined solely
//! by the type code; all multi-byte integers are big-endian.

// ── Protocol constants ────────────────────────────────────────────────────────

/// Protocol major version spoken by this client.
pub const PROTOCOL_MAJOR: u16 = 1;

/// Protocol minor version advertised in HELLOBACK.
pub const PROTOCOL_MINOR: u16 = 6;

/// Oldest server minor version the client will talk to.
pub const PROTOCOL_MINOR_MIN: u16 = 3;

/// Size of the framing header in bytes.
pub const HEADER_SIZE: usize = 6;

/// Largest body the client accepts.  Anything bigger is a framing error and
/// is rejected before the body is buffered.
pub const MAX_BODY_LEN: u32 = 64 * 1024;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes understood by the client.
///
/// QUIT is absent because it is a local event, never a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    // Input stream (0x0001–0x000F)
    Enter = 0x0001,
    Leave = 0x0002,
    KeyDown = 0x0003,
    KeyUp = 0x0004,
    KeyRepeat = 0x0005,
    MouseMove = 0x0006,
    MouseButton = 0x0007,
    MouseWheel = 0x0008,
    KeepAlive = 0x0009,
    Close = 0x000A,
    // Handshake and screen info (0x0010–0x001F)
    Hello = 0x0010,
    HelloBack = 0x0011,
    QueryInfo = 0x0012,
    ScreenInfo = 0x0013,
    InfoAck = 0x0014,
    // Rejections (0x0020–0x002F)
    Incompatible = 0x0020,
    Busy = 0x0021,
    UnknownClient = 0x0022,
    BadProtocol = 0x0023,
}

impl TryFrom<u16> for MessageType {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, ()> {
        match value {
            0x0001 => Ok(MessageType::Enter),
            0x0002 => Ok(MessageType::Leave),
            0x0003 => Ok(MessageType::KeyDown),
            0x0004 => Ok(MessageType::KeyUp),
            0x0005 => Ok(MessageType::KeyRepeat),
            0x0006 => Ok(MessageType::MouseMove),
            0x0007 => Ok(MessageType::MouseButton),
            0x0008 => Ok(MessageType::MouseWheel),
            0x0009 => Ok(MessageType::KeepAlive),
            0x000A => Ok(MessageType::Close),
            0x0010 => Ok(MessageType::Hello),
            0x0011 => Ok(MessageType::HelloBack),
            0x0012 => Ok(MessageType::QueryInfo),
            0x0013 => Ok(MessageType::ScreenInfo),
            0x0014 => Ok(MessageType::InfoAck),
            0x0020 => Ok(MessageType::Incompatible),
            0x0021 => Ok(MessageType::Busy),
            0x0022 => Ok(MessageType::UnknownClient),
            0x0023 => Ok(MessageType::BadProtocol),
            _ => Err(()),
        }
    }
}

impl MessageType {
    /// Body size in bytes for kinds with a fixed layout.
    ///
    /// Returns `None` for HELLOBACK, whose body ends with a length-prefixed
    /// client name.
    pub fn fixed_body_len(self) -> Option<usize> {
        match self {
            MessageType::Enter => Some(10),
            MessageType::KeyDown | MessageType::KeyUp => Some(6),
            MessageType::KeyRepeat => Some(8),
            MessageType::MouseMove | MessageType::MouseWheel => Some(4),
            MessageType::MouseButton => Some(2),
            MessageType::Hello | MessageType::Incompatible => Some(4),
            MessageType::ScreenInfo => Some(14),
            MessageType::HelloBack => None,
            MessageType::Leave
            | MessageType::KeepAlive
            | MessageType::Close
            | MessageType::QueryInfo
            | MessageType::InfoAck
            | MessageType::Busy
            | MessageType::UnknownClient
            | MessageType::BadProtocol => Some(0),
        }
    }
}

// ── Framing header ────────────────────────────────────────────────────────────

/// The 6-byte envelope preceding every message body.
///
/// The type code is kept raw so that an unrecognized code survives header
/// parsing and is reported by the body decoder as a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Length of the body in bytes (not including this header).
    pub length: u32,
    /// Raw message type code.
    pub type_code: u16,
}

impl MessageHeader {
    /// Builds a header for a body of `length` bytes of the given kind.
    pub fn new(message_type: MessageType, length: u32) -> Self {
        Self {
            length,
            type_code: message_type as u16,
        }
    }

    /// Parses a header from exactly [`HEADER_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            length: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            type_code: u16::from_be_bytes([bytes[4], bytes[5]]),
        }
    }

    /// Serializes the header into its wire form.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.length.to_be_bytes());
        out[4..6].copy_from_slice(&self.type_code.to_be_bytes());
        out
    }
}

// ── Modifier mask ─────────────────────────────────────────────────────────────

/// Bitmask of held modifier keys and active toggle keys.
///
/// Carried by ENTER (as the set of keys held when the cursor arrived) and by
/// every key message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierMask(pub u16);

impl ModifierMask {
    pub const SHIFT: u16 = 0x0001;
    pub const CONTROL: u16 = 0x0002;
    pub const ALT: u16 = 0x0004;
    pub const META: u16 = 0x0008;
    pub const SUPER: u16 = 0x0010;
    pub const ALT_GR: u16 = 0x0020;
    pub const CAPS_LOCK: u16 = 0x1000;
    pub const NUM_LOCK: u16 = 0x2000;
    pub const SCROLL_LOCK: u16 = 0x4000;

    /// Returns `true` if every bit in `flag` is set.
    pub fn contains(&self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn shift(&self) -> bool {
        self.contains(Self::SHIFT)
    }

    pub fn control(&self) -> bool {
        self.contains(Self::CONTROL)
    }

    pub fn alt(&self) -> bool {
        self.contains(Self::ALT)
    }

    /// Returns `true` if any toggle key (Caps/Num/Scroll Lock) is active.
    pub fn any_lock(&self) -> bool {
        self.0 & (Self::CAPS_LOCK | Self::NUM_LOCK | Self::SCROLL_LOCK) != 0
    }
}

// ── Per-message body structs ──────────────────────────────────────────────────

/// ENTER (0x0001): the cursor has moved onto this client's screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnterMessage {
    /// Entry X coordinate in the client's screen space.
    pub x: i16,
    /// Entry Y coordinate in the client's screen space.
    pub y: i16,
    /// Monotonically increasing per connection; used to detect stale or
    /// duplicated enters.
    pub sequence_number: i32,
    /// Modifier keys held at the moment of entry.
    pub mask: i16,
}

impl EnterMessage {
    /// The entry mask reinterpreted as a [`ModifierMask`].
    pub fn modifiers(&self) -> ModifierMask {
        ModifierMask(self.mask as u16)
    }
}

/// DKEYDOWN (0x0003) and DKEYUP (0x0004).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMessage {
    /// Key identifier (platform-independent key symbol).
    pub id: u16,
    /// Modifier state at the time of the event.
    pub mask: u16,
    /// Platform key/button code (physical key).
    pub button: u16,
}

impl KeyMessage {
    pub fn modifiers(&self) -> ModifierMask {
        ModifierMask(self.mask)
    }
}

/// DKEYREPEAT (0x0005): auto-repeat of a held key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRepeatMessage {
    pub id: u16,
    pub mask: u16,
    /// Number of repeats since the previous message.
    pub count: u16,
    pub button: u16,
}

/// DMOUSEMOVE (0x0006): absolute cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseMoveMessage {
    pub x: i16,
    pub y: i16,
}

/// Standard mouse button identifiers used in [`MouseButtonMessage::button`].
pub mod mouse_buttons {
    pub const LEFT: u8 = 1;
    pub const MIDDLE: u8 = 2;
    pub const RIGHT: u8 = 3;
}

/// DMOUSEBUTTON (0x0007): button press or release.
///
/// Wire layout: `button:u8`, `state:u8` where state is 0 (up) or 1 (down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseButtonMessage {
    pub button: u8,
    pub pressed: bool,
}

/// DMOUSEWHEEL (0x0008): scroll deltas, 120 units per notch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseWheelMessage {
    pub x_delta: i16,
    pub y_delta: i16,
}

/// HELLO (0x0010): first message the server sends after accepting a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloMessage {
    pub major: u16,
    pub minor: u16,
}

/// HELLOBACK (0x0011): the client's reply, identifying itself by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloBackMessage {
    pub major: u16,
    pub minor: u16,
    /// Screen name the server uses to place this client.
    pub name: String,
}

/// DINFO (0x0013): the client's screen geometry, sent in answer to QINFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfoMessage {
    pub x: i16,
    pub y: i16,
    pub width: i16,
    pub height: i16,
    /// Obsolete jump-zone size; always 0 from this client.
    pub warp_zone: i16,
    pub mouse_x: i16,
    pub mouse_y: i16,
}

/// EINCOMPATIBLE (0x0020): the server refuses our protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompatibleMessage {
    /// Server's major version.
    pub major: u16,
    /// Server's minor version.
    pub minor: u16,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// Every valid deskshare wire message, discriminated by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Enter(EnterMessage),
    Leave,
    KeyDown(KeyMessage),
    KeyUp(KeyMessage),
    KeyRepeat(KeyRepeatMessage),
    MouseMove(MouseMoveMessage),
    MouseButton(MouseButtonMessage),
    MouseWheel(MouseWheelMessage),
    KeepAlive,
    Close,
    Hello(HelloMessage),
    HelloBack(HelloBackMessage),
    QueryInfo,
    ScreenInfo(ScreenInfoMessage),
    InfoAck,
    Incompatible(IncompatibleMessage),
    Busy,
    UnknownClient,
    BadProtocol,
}

impl Message {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Enter(_) => MessageType::Enter,
            Message::Leave => MessageType::Leave,
            Message::KeyDown(_) => MessageType::KeyDown,
            Message::KeyUp(_) => MessageType::KeyUp,
            Message::KeyRepeat(_) => MessageType::KeyRepeat,
            Message::MouseMove(_) => MessageType::MouseMove,
            Message::MouseButton(_) => MessageType::MouseButton,
            Message::MouseWheel(_) => MessageType::MouseWheel,
            Message::KeepAlive => MessageType::KeepAlive,
            Message::Close => MessageType::Close,
            Message::Hello(_) => MessageType::Hello,
            Message::HelloBack(_) => MessageType::HelloBack,
            Message::QueryInfo => MessageType::QueryInfo,
            Message::ScreenInfo(_) => MessageType::ScreenInfo,
            Message::InfoAck => MessageType::InfoAck,
            Message::Incompatible(_) => MessageType::Incompatible,
            Message::Busy => MessageType::Busy,
            Message::UnknownClient => MessageType::UnknownClient,
            Message::BadProtocol => MessageType::BadProtocol,
        }
    }

    /// Returns `true` for messages that end up as injected input.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Message::Enter(_)
                | Message::Leave
                | Message::KeyDown(_)
                | Message::KeyUp(_)
                | Message::KeyRepeat(_)
                | Message::MouseMove(_)
                | Message::MouseButton(_)
                | Message::MouseWheel(_)
        )
    }

    /// Returns `true` for the server's rejection messages.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Message::Incompatible(_) | Message::Busy | Message::UnknownClient | Message::BadProtocol
        )
    }
}
