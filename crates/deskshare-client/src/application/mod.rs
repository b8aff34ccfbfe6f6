//! Application layer of the client.
//!
//! - **`events`** – The [`events::Event`] type carried by the event queue,
//!   and the [`events::ConnectionState`] lifecycle it reports.
//!
//! - **`reconnect`** – The shared auto-reconnect flag and the observer the
//!   UI implements to hear about it.
//!
//! - **`inject_input`** – Turns decoded input messages into
//!   [`inject_input::InputAction`]s for a [`inject_input::Screen`].
//!
//! - **`dispatch`** – The loop that drains the event queue on its own thread
//!   and routes each event to a handler.
//!
//! Nothing here touches sockets or the file system.

pub mod dispatch;
pub mod events;
pub mod inject_input;
pub mod reconnect;
