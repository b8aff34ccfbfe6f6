//! Bridge between a user interface and the running client.
//!
//! A UI (or the binary's `main`) never touches the connection task or the
//! dispatch thread directly.  It drives the client through a
//! [`ClientController`] and hears back through a
//! [`ReconnectObserver`](crate::application::reconnect::ReconnectObserver):
//!
//! ```text
//! UI                    ClientController            connection task
//! ─────────────────────────────────────────────────────────────────
//! connect()        ──▶  spawn run(disconnect_rx) ──▶ Connecting …
//! disconnect()     ──▶  disconnect_tx.send(true) ──▶ Disconnected
//! set_auto_reconnect(b) ─▶ queue.post(Reconnect*) ─▶ (dispatch thread
//!                                                      flips the flag)
//!
//! dispatch thread       StatusHandler               observer
//! ─────────────────────────────────────────────────────────────────
//! StateChanged / Diagnostic ──▶ on_status(state, message) ──▶ UI
//! ```
//!
//! Toggling auto-reconnect goes through the event queue so that the observer
//! is notified on the dispatch thread, in order with everything else.

use std::sync::{Arc, Mutex, PoisonError};

use deskshare_core::{EventQueue, QueueClosed};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::application::dispatch::{DispatchError, EventHandler};
use crate::application::events::{ConnectionState, Event, EventPayload};
use crate::application::reconnect::{AutoReconnect, ReconnectObserver};
use crate::infrastructure::network::ClientConnection;

/// One connection task, running or unwinding.
struct Session {
    disconnect: watch::Sender<bool>,
    /// Flips to `true` once `run` has returned.
    finished: watch::Receiver<bool>,
    abort: AbortHandle,
}

impl Session {
    fn is_running(&self) -> bool {
        !self.abort.is_finished()
    }

    fn is_stopping(&self) -> bool {
        *self.disconnect.borrow()
    }
}

/// Commands a UI can issue.
pub struct ClientController {
    connection: Arc<ClientConnection>,
    queue: Arc<EventQueue<Event>>,
    reconnect: Arc<AutoReconnect>,
    runtime: Handle,
    session: Mutex<Option<Session>>,
}

impl ClientController {
    /// Creates a controller whose connection tasks run on `runtime`.
    pub fn new(
        connection: Arc<ClientConnection>,
        queue: Arc<EventQueue<Event>>,
        reconnect: Arc<AutoReconnect>,
        runtime: Handle,
    ) -> Self {
        Self {
            connection,
            queue,
            reconnect,
            runtime,
            session: Mutex::new(None),
        }
    }

    /// Starts a connection task.
    ///
    /// Returns `None` if one is already running.  If the previous task was
    /// told to disconnect but has not finished yet, the new one waits for it
    /// before it starts connecting.  The returned handle completes when the
    /// machine reaches `Disconnected`.
    pub fn connect(&self) -> Option<JoinHandle<()>> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.as_ref().is_some_and(|s| s.is_running() && !s.is_stopping()) {
            debug!("connect ignored: a session is already running");
            return None;
        }
        let previous = session
            .take()
            .filter(Session::is_running)
            .map(|s| s.finished);

        let (tx, rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let connection = Arc::clone(&self.connection);
        let handle = self.runtime.spawn(async move {
            if let Some(mut previous) = previous {
                debug!("waiting for the previous session to finish");
                // An error means the previous task is gone, which is just as good.
                let _ = previous.wait_for(|done| *done).await;
            }
            connection.run(rx).await;
            let _ = done_tx.send(true);
        });
        info!(server = %self.connection.config().server_addr, "connect requested");

        *session = Some(Session {
            disconnect: tx,
            finished: done_rx,
            abort: handle.abort_handle(),
        });
        Some(handle)
    }

    /// Asks the running connection task to stop.  Returns `false` if none
    /// was running or it was already asked.
    pub fn disconnect(&self) -> bool {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        match session.as_ref() {
            Some(s) if s.is_running() && !s.is_stopping() => {
                info!("disconnect requested");
                s.disconnect.send_replace(true);
                true
            }
            _ => false,
        }
    }

    /// Switches auto-reconnect on or off.
    ///
    /// The change is applied by the dispatch thread, which also notifies the
    /// observer.
    ///
    /// # Errors
    ///
    /// [`QueueClosed`] if the client is shutting down.
    pub fn set_auto_reconnect(&self, enabled: bool) -> Result<(), QueueClosed> {
        self.queue.post(Event::reconnect(enabled))
    }

    pub fn auto_reconnect(&self) -> bool {
        self.reconnect.is_enabled()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }
}

/// Forwards connection status events to the observer.
///
/// Registered for [`EventTarget::Client`](crate::application::events::EventTarget::Client).
pub struct StatusHandler {
    observer: Arc<dyn ReconnectObserver>,
    last: ConnectionState,
}

impl StatusHandler {
    pub fn new(observer: Arc<dyn ReconnectObserver>) -> Self {
        Self {
            observer,
            last: ConnectionState::Disconnected,
        }
    }

    /// The most recent state reported.
    pub fn last_state(&self) -> ConnectionState {
        self.last
    }
}

impl EventHandler for StatusHandler {
    fn handle(&mut self, event: Event) -> Result<(), DispatchError> {
        match event.payload {
            EventPayload::StateChanged(state) => {
                self.last = state;
                self.observer.on_status(state, "");
            }
            EventPayload::Diagnostic { message } => self.observer.on_status(self.last, &message),
            other => debug!(?other, "status handler ignored event"),
        }
        Ok(())
    }
}

/// Observer that reports through `tracing`, for running without a UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ReconnectObserver for LoggingObserver {
    fn on_reconnect_enabled(&self) {
        info!("auto-reconnect is on");
    }

    fn on_reconnect_disabled(&self) {
        info!("auto-reconnect is off");
    }

    fn on_status(&self, state: ConnectionState, message: &str) {
        if message.is_empty() {
            info!(%state, "status");
        } else {
            warn!(%state, "{message}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
