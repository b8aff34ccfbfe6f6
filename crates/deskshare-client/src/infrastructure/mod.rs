//! Infrastructure layer for the client application.
//!
//! Contains the OS-facing adapters: network I/O, screens, configuration
//! files, and the bridge a UI drives the client through.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `deskshare_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – The connection state machine: connect, handshake,
//!   streaming, and reconnect with backoff.
//!
//! - **`screen`** – [`Screen`](crate::application::inject_input::Screen)
//!   implementations.  `BasicScreen` logs what it would inject; `MockScreen`
//!   records it for tests.
//!
//! - **`storage`** – TOML configuration persistence.
//!
//! - **`ui_bridge`** – The controller a UI (or `main`) uses to connect,
//!   disconnect and toggle auto-reconnect, plus the handler that forwards
//!   connection status to the UI observer.

pub mod network;
pub mod screen;
pub mod storage;
pub mod ui_bridge;
