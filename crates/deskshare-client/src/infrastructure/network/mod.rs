//! Network infrastructure: the client connection state machine.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected → Connecting → Handshaking → Streaming
//!                   ↑    │          │           │
//!                   │    └──────────┴───────────┤ failure / session end
//!                   │                           ▼
//!                   └────── Reconnecting ◀── auto-reconnect on?
//!                                               │ no
//!                                               ▼
//!                                          Disconnected
//! ```
//!
//! [`ClientConnection::run`] drives one server endpoint through these
//! states on a tokio task.  Every transition is posted to the event queue as
//! a `StateChanged` event; failures are also posted as `Diagnostic` events.
//! Decoded input is posted as `Message` events for the screen, followed by a
//! `SessionEnded` event once streaming stops.
//!
//! The auto-reconnect flag is read each time the machine has to choose
//! between `Reconnecting` and `Disconnected`, and again when a backoff wait
//! ends.  Switching it off during a backoff wait ends the wait at once.
//! An explicit disconnect request wins over everything and is honoured in
//! every blocking step: connect, handshake, stream reads, and backoff.

pub mod backoff;
pub mod framing;
pub mod handshake;
pub mod transport;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use deskshare_core::protocol::messages::{MessageType, ScreenInfoMessage};
use deskshare_core::protocol::EnterSequenceGuard;
use deskshare_core::{CodecError, EventQueue, Message, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, trace, warn};

use crate::application::events::{ConnectionState, Event};
use crate::application::inject_input::ScreenShape;
use crate::application::reconnect::AutoReconnect;

use self::backoff::Backoff;
use self::framing::{read_message, write_message, StreamError};
use self::handshake::HandshakeError;
use self::transport::{ConnectError, SocketFactory};

/// Why a streaming session ended.
#[derive(Debug, Error)]
pub enum ConnectionLost {
    /// The server sent CCLOSE.
    #[error("server closed the session")]
    ClosedByServer,
    /// Nothing arrived within the read timeout.
    #[error("no data from server for {0:?}")]
    ReadTimeout(Duration),
    /// The server sent a rejection mid-stream.
    #[error("server rejected the session: {0:?}")]
    Rejected(MessageType),
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// The user asked to disconnect.
    #[error("disconnect requested")]
    LocalDisconnect,
    /// Nobody is consuming events any more.
    #[error("event queue closed")]
    QueueClosed,
}

impl ConnectionLost {
    /// `false` for the local reasons that must never trigger a reconnect.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ConnectionLost::LocalDisconnect | ConnectionLost::QueueClosed
        )
    }
}

impl From<CodecError> for ConnectionLost {
    fn from(e: CodecError) -> Self {
        ConnectionLost::Stream(StreamError::Codec(e))
    }
}

/// Settings for one server endpoint.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// `host:port` of the server.
    pub server_addr: String,
    /// Name sent in HELLOBACK.
    pub client_name: String,
    /// Geometry reported in DINFO.
    pub screen: ScreenShape,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:24800".to_string(),
            client_name: "deskshare-client".to_string(),
            screen: ScreenShape::new(1920, 1080),
            reconnect_initial: Duration::from_millis(1000),
            reconnect_max: Duration::from_millis(30_000),
            connect_timeout: Duration::from_millis(5000),
            handshake_timeout: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(10_000),
        }
    }
}

/// How one connect attempt ended.
enum Attempt {
    /// Stop: the user disconnected or the queue is gone.
    Stop,
    /// Follow reconnect branching.
    Retry,
    /// Failed in a way a retry would not fix.
    GiveUp,
}

/// Resolves once a disconnect has been requested or the requester is gone.
async fn disconnect_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|requested| *requested).await;
}

/// Drives the connection to one server.
pub struct ClientConnection {
    config: ConnectionConfig,
    factory: Arc<dyn SocketFactory>,
    queue: Arc<EventQueue<Event>>,
    reconnect: Arc<AutoReconnect>,
    state: Mutex<ConnectionState>,
}

impl ClientConnection {
    pub fn new(
        config: ConnectionConfig,
        factory: Arc<dyn SocketFactory>,
        queue: Arc<EventQueue<Event>>,
        reconnect: Arc<AutoReconnect>,
    ) -> Self {
        Self {
            config,
            factory,
            queue,
            reconnect,
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// The state most recently entered.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Runs sessions until the machine reaches `Disconnected`.
    ///
    /// Sending `true` on the paired `watch::Sender` (or dropping it) is an
    /// explicit disconnect.
    pub async fn run(&self, mut disconnect: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.config.reconnect_initial, self.config.reconnect_max);

        loop {
            let attempt = self.attempt(&mut disconnect, &mut backoff).await;

            let retry = match attempt {
                Attempt::Retry => !*disconnect.borrow() && self.reconnect.is_enabled(),
                Attempt::Stop | Attempt::GiveUp => false,
            };
            if !retry {
                break;
            }

            self.transition(ConnectionState::Reconnecting);
            let delay = backoff.next_delay();
            info!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
            if !self.wait_backoff(delay, &mut disconnect).await {
                break;
            }
        }

        self.transition(ConnectionState::Disconnected);
    }

    /// One pass through Connecting → Handshaking → Streaming.
    async fn attempt(
        &self,
        disconnect: &mut watch::Receiver<bool>,
        backoff: &mut Backoff,
    ) -> Attempt {
        let addr = self.config.server_addr.as_str();
        self.transition(ConnectionState::Connecting);

        let connected = tokio::select! {
            r = time::timeout(self.config.connect_timeout, self.factory.connect(addr)) => {
                r.unwrap_or_else(|_| Err(ConnectError::Timeout { addr: addr.to_string() }))
            }
            _ = disconnect_requested(disconnect) => return Attempt::Stop,
        };
        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                self.diagnostic(format!("connect failed: {e}"));
                return Attempt::Retry;
            }
        };
        info!(%addr, "connected");

        self.transition(ConnectionState::Handshaking);
        let (mut reader, mut writer) = tokio::io::split(stream);
        let handshake = tokio::select! {
            r = time::timeout(
                self.config.handshake_timeout,
                handshake::perform(&mut reader, &mut writer, &self.config.client_name),
            ) => r.unwrap_or(Err(HandshakeError::Timeout)),
            _ = disconnect_requested(disconnect) => return Attempt::Stop,
        };
        let first = match handshake {
            Ok(first) => first,
            Err(e) => {
                self.diagnostic(format!("handshake failed: {e}"));
                return if e.is_retryable() {
                    Attempt::Retry
                } else {
                    Attempt::GiveUp
                };
            }
        };

        self.transition(ConnectionState::Streaming);
        backoff.reset();

        let lost = self.stream(&mut reader, &mut writer, first, disconnect).await;
        if self.queue.post(Event::session_ended()).is_err() {
            debug!("event queue closed; session end not delivered");
        }
        if lost.is_retryable() {
            self.diagnostic(format!("connection lost: {lost}"));
            Attempt::Retry
        } else {
            info!("session ended: {lost}");
            Attempt::Stop
        }
    }

    /// Reads and processes messages until the session ends.
    async fn stream<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        first: Message,
        disconnect: &mut watch::Receiver<bool>,
    ) -> ConnectionLost
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut sequence = EnterSequenceGuard::new();
        let mut next = Some(first);

        loop {
            let msg = match next.take() {
                Some(msg) => msg,
                None => tokio::select! {
                    r = time::timeout(self.config.read_timeout, read_message(reader)) => match r {
                        Ok(Ok(msg)) => msg,
                        Ok(Err(e)) => return e.into(),
                        Err(_) => return ConnectionLost::ReadTimeout(self.config.read_timeout),
                    },
                    _ = disconnect_requested(disconnect) => return ConnectionLost::LocalDisconnect,
                },
            };
            if let Err(lost) = self.process(msg, writer, &mut sequence).await {
                return lost;
            }
        }
    }

    /// Handles one streamed message.  `Err` ends the session.
    async fn process<W>(
        &self,
        msg: Message,
        writer: &mut W,
        sequence: &mut EnterSequenceGuard,
    ) -> Result<(), ConnectionLost>
    where
        W: AsyncWrite + Unpin,
    {
        trace!(kind = ?msg.message_type(), "streamed message");
        match msg {
            Message::KeepAlive => write_message(writer, &Message::KeepAlive).await?,
            Message::QueryInfo => {
                let info = self.screen_info();
                debug!(width = info.width, height = info.height, "answering screen query");
                write_message(writer, &Message::ScreenInfo(info)).await?;
            }
            Message::InfoAck => debug!("server acknowledged screen info"),
            Message::Close => return Err(ConnectionLost::ClosedByServer),
            ref m if m.is_rejection() => return Err(ConnectionLost::Rejected(m.message_type())),
            Message::Enter(enter) => {
                sequence
                    .check(enter.sequence_number)
                    .map_err(|e| ConnectionLost::from(CodecError::from(e)))?;
                self.post(Event::message(Message::Enter(enter)))?;
            }
            m if m.is_input() => self.post(Event::message(m))?,
            other => {
                return Err(CodecError::from(ProtocolError::UnexpectedMessage {
                    kind: other.message_type(),
                    phase: "streaming",
                })
                .into())
            }
        }
        Ok(())
    }

    /// DINFO for the configured screen: origin 0,0, cursor at the centre.
    fn screen_info(&self) -> ScreenInfoMessage {
        let shape = self.config.screen;
        let (mouse_x, mouse_y) = shape.centre();
        ScreenInfoMessage {
            x: 0,
            y: 0,
            width: clamp_i16(i32::from(shape.width)),
            height: clamp_i16(i32::from(shape.height)),
            warp_zone: 0,
            mouse_x: clamp_i16(mouse_x),
            mouse_y: clamp_i16(mouse_y),
        }
    }

    /// Waits out `delay`.  Returns `false` if the machine must stop instead
    /// of reconnecting.
    async fn wait_backoff(&self, delay: Duration, disconnect: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = time::sleep(delay) => !*disconnect.borrow() && self.reconnect.is_enabled(),
            _ = disconnect_requested(disconnect) => false,
            _ = self.reconnect.disabled() => {
                info!("auto-reconnect switched off during backoff");
                false
            }
        }
    }

    fn post(&self, event: Event) -> Result<(), ConnectionLost> {
        self.queue.post(event).map_err(|_| ConnectionLost::QueueClosed)
    }

    fn transition(&self, next: ConnectionState) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, next)
        };
        info!(from = %previous, to = %next, "connection state changed");
        if self.queue.post(Event::state_changed(next)).is_err() {
            debug!("event queue closed; state change not delivered");
        }
    }

    fn diagnostic(&self, message: String) {
        warn!("{message}");
        if self.queue.post(Event::diagnostic(message)).is_err() {
            debug!("event queue closed; diagnostic not delivered");
        }
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(screen: ScreenShape) -> ClientConnection {
        ClientConnection::new(
            ConnectionConfig {
                screen,
                ..ConnectionConfig::default()
            },
            Arc::new(transport::TcpSocketFactory),
            Arc::new(EventQueue::new()),
            Arc::new(AutoReconnect::default()),
        )
    }

    #[test]
    fn test_default_config_matches_documented_values() {
        let cfg = ConnectionConfig::default();
        assert_eq!(cfg.server_addr, "127.0.0.1:24800");
        assert_eq!(cfg.reconnect_initial, Duration::from_secs(1));
        assert_eq!(cfg.reconnect_max, Duration::from_secs(30));
        assert_eq!(cfg.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_new_connection_is_disconnected() {
        let conn = connection(ScreenShape::new(800, 600));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_screen_info_reports_shape_and_centre() {
        let conn = connection(ScreenShape::new(2560, 1440));
        let info = conn.screen_info();
        assert_eq!((info.x, info.y), (0, 0));
        assert_eq!((info.width, info.height), (2560, 1440));
        assert_eq!((info.mouse_x, info.mouse_y), (1280, 720));
        assert_eq!(info.warp_zone, 0);
    }

    #[test]
    fn test_screen_info_saturates_oversized_shape() {
        let conn = connection(ScreenShape::new(u16::MAX, 100));
        assert_eq!(conn.screen_info().width, i16::MAX);
    }

    #[test]
    fn test_local_reasons_are_not_retryable() {
        assert!(!ConnectionLost::LocalDisconnect.is_retryable());
        assert!(!ConnectionLost::QueueClosed.is_retryable());
        assert!(ConnectionLost::ClosedByServer.is_retryable());
        assert!(ConnectionLost::ReadTimeout(Duration::from_secs(1)).is_retryable());
        assert!(ConnectionLost::Stream(StreamError::Closed).is_retryable());
    }
}
