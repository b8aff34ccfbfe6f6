//! Protocol module containing message types, the binary codec, and the
//! enter-sequence guard.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{
    decode_body, decode_message, encode_message, CodecError, FramingError, ProtocolError,
};
pub use messages::*;
pub use sequence::EnterSequenceGuard;
