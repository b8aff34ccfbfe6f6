//! # deskshare-core
//!
//! Shared foundation of the deskshare input-sharing client: the binary wire
//! protocol and the ordered event queue that carries work between threads.
//!
//! This crate has no dependencies on OS APIs, sockets, or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! deskshare lets one keyboard and mouse control several computers.  A
//! *server* owns the physical devices and streams input events to *clients*
//! over a TCP connection; each client injects those events into its own
//! desktop so it behaves as if the keyboard and mouse were plugged into it.
//!
//! This crate defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Every message is a
//!   6-byte header (body length + type code) followed by a big-endian body,
//!   decoded into the closed [`Message`] enum.
//!
//! - **`event_queue`** – A thread-safe FIFO with blocking retrieval and
//!   deferred timer events.  The network task posts decoded messages into it
//!   and a single dispatch thread drains it.

pub mod event_queue;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `deskshare_core::Message` instead of `deskshare_core::protocol::messages::Message`.
pub use event_queue::{EventQueue, QueueClosed};
pub use protocol::codec::{
    decode_body, decode_message, encode_message, CodecError, FramingError, ProtocolError,
};
pub use protocol::messages::{Message, MessageHeader, MessageType};
