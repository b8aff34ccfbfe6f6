//! Events routed through the client's event queue.

use std::fmt;

use deskshare_core::Message;

/// Lifecycle of the connection to one server.
///
/// ```text
/// Disconnected → Connecting → Handshaking → Streaming
///                    ↑                          │
///                    └──── Reconnecting ←───────┘ (auto-reconnect on)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket.  Initial state and the end of every session.
    #[default]
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Exchanging HELLO / HELLOBACK.
    Handshaking,
    /// Receiving input from the server.
    Streaming,
    /// Waiting out the backoff before the next connect attempt.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Streaming => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(text)
    }
}

/// Which handler an event is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTarget {
    /// The local screen: input injection.
    Screen,
    /// The client itself: connection status and diagnostics.
    Client,
    /// The dispatch loop: reconnect control and quit.
    System,
}

/// What an event carries.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// A message decoded from the server.
    Message(Message),
    /// The streaming session ended.  Input state from it no longer applies.
    SessionEnded,
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
    /// Something went wrong that the user should hear about.
    Diagnostic { message: String },
    /// The user switched auto-reconnect on.
    ReconnectEnabled,
    /// The user switched auto-reconnect off.
    ReconnectDisabled,
    /// Stop the dispatch loop.  Local only; never sent on the wire.
    Quit,
}

/// Discriminant of an [`EventPayload`], for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Message,
    SessionEnded,
    StateChanged,
    Diagnostic,
    ReconnectEnabled,
    ReconnectDisabled,
    Quit,
}

/// One unit of work for the dispatch loop.  Consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub target: EventTarget,
    pub payload: EventPayload,
}

impl Event {
    /// A decoded server message for the screen.
    pub fn message(msg: Message) -> Self {
        Self {
            target: EventTarget::Screen,
            payload: EventPayload::Message(msg),
        }
    }

    /// End of a streaming session, for the screen.
    pub fn session_ended() -> Self {
        Self {
            target: EventTarget::Screen,
            payload: EventPayload::SessionEnded,
        }
    }

    pub fn state_changed(state: ConnectionState) -> Self {
        Self {
            target: EventTarget::Client,
            payload: EventPayload::StateChanged(state),
        }
    }

    pub fn diagnostic(message: impl Into<String>) -> Self {
        Self {
            target: EventTarget::Client,
            payload: EventPayload::Diagnostic {
                message: message.into(),
            },
        }
    }

    /// `ReconnectEnabled` or `ReconnectDisabled` depending on `enabled`.
    pub fn reconnect(enabled: bool) -> Self {
        Self {
            target: EventTarget::System,
            payload: if enabled {
                EventPayload::ReconnectEnabled
            } else {
                EventPayload::ReconnectDisabled
            },
        }
    }

    pub fn quit() -> Self {
        Self {
            target: EventTarget::System,
            payload: EventPayload::Quit,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::Message(_) => EventType::Message,
            EventPayload::SessionEnded => EventType::SessionEnded,
            EventPayload::StateChanged(_) => EventType::StateChanged,
            EventPayload::Diagnostic { .. } => EventType::Diagnostic,
            EventPayload::ReconnectEnabled => EventType::ReconnectEnabled,
            EventPayload::ReconnectDisabled => EventType::ReconnectDisabled,
            EventPayload::Quit => EventType::Quit,
        }
    }
}
