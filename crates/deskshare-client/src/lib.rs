//! deskshare-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does deskshare-client do? (for beginners)
//!
//! The *client* is a computer whose keyboard and mouse are driven by a
//! deskshare *server* on another machine.  When the server's cursor crosses
//! onto this client's screen, the server sends ENTER and then streams key and
//! mouse messages until the cursor leaves again.
//!
//! The client application:
//!
//! 1. Connects to the server over TCP and answers its HELLO with HELLOBACK.
//! 2. Reports its screen size when the server asks (QINFO → DINFO).
//! 3. Decodes every incoming message and posts it onto the event queue.
//! 4. Drains the queue on a dispatch thread and injects the input into the
//!    local desktop through a [`application::inject_input::Screen`].
//! 5. Reconnects with exponential backoff when the connection drops, unless
//!    auto-reconnect has been switched off.

/// Application layer: events, input injection and the dispatch loop.
pub mod application;

/// Infrastructure layer: network, screens, configuration, and UI bridge.
pub mod infrastructure;
