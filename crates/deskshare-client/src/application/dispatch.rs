//! The main dispatch loop.
//!
//! # How it works (for beginners)
//!
//! One dedicated thread blocks on the event queue, takes events off one at a
//! time and hands each to the handler registered for its
//! [`EventTarget`].  Because a single thread does all of this, handlers never
//! run concurrently with each other and see events in queue order.
//!
//! Three events are handled by the loop itself:
//!
//! - `Quit` ends the loop.
//! - `ReconnectEnabled` / `ReconnectDisabled` flip the shared
//!   [`AutoReconnect`] flag and notify the [`ReconnectObserver`] before the
//!   next event is taken.
//!
//! # Supersession
//!
//! Only one loop may run at a time.  Each loop claims a new value of a shared
//! generation counter when it starts and exits as soon as it sees a newer
//! value.  Starting a new loop is therefore the way to stop the old one.
//!
//! # Cleanup
//!
//! The screen is stopped by a drop guard, so it happens however the loop
//! ends: quit, supersession, an unrecoverable error, or a panic in a handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use deskshare_core::EventQueue;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::application::events::{Event, EventPayload, EventTarget};
use crate::application::inject_input::Screen;
use crate::application::reconnect::{AutoReconnect, ReconnectObserver};

/// How long one `get` waits before the loop re-checks the generation counter.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A handler failed to process an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// This event could not be processed.  The loop logs it and continues.
    #[error("handler error: {0}")]
    Handler(String),
    /// The loop cannot continue.
    #[error("unrecoverable handler error: {0}")]
    Unrecoverable(String),
}

impl DispatchError {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, DispatchError::Unrecoverable(_))
    }
}

/// Processes the events sent to one [`EventTarget`].
pub trait EventHandler: Send {
    /// # Errors
    ///
    /// [`DispatchError::Unrecoverable`] ends the dispatch loop; any other
    /// error is logged and the event is dropped.
    fn handle(&mut self, event: Event) -> Result<(), DispatchError>;
}

/// Why a dispatch loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// A `Quit` event was processed.
    Quit,
    /// A newer loop started.
    Superseded,
    /// The event queue was shut down.
    QueueClosed,
    /// A handler returned an unrecoverable error.
    Failed(DispatchError),
}

/// Shared counter used to detect a newer dispatch loop.
#[derive(Debug, Clone, Default)]
pub struct LoopGeneration(Arc<AtomicU64>);

impl LoopGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.0.load(Ordering::SeqCst) == generation
    }
}

struct StopScreenOnExit(Arc<dyn Screen>);

impl Drop for StopScreenOnExit {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("dispatch loop panicked; stopping screen");
        }
        self.0.stop();
    }
}

/// Drains the event queue and routes events to handlers.
pub struct DispatchLoop {
    queue: Arc<EventQueue<Event>>,
    reconnect: Arc<AutoReconnect>,
    observer: Arc<dyn ReconnectObserver>,
    screen: Arc<dyn Screen>,
    generation: LoopGeneration,
    handlers: HashMap<EventTarget, Box<dyn EventHandler>>,
    poll_interval: Duration,
}

impl DispatchLoop {
    pub fn new(
        queue: Arc<EventQueue<Event>>,
        reconnect: Arc<AutoReconnect>,
        observer: Arc<dyn ReconnectObserver>,
        screen: Arc<dyn Screen>,
        generation: LoopGeneration,
    ) -> Self {
        Self {
            queue,
            reconnect,
            observer,
            screen,
            generation,
            handlers: HashMap::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Routes events for `target` to `handler`, replacing any earlier one.
    pub fn register(&mut self, target: EventTarget, handler: Box<dyn EventHandler>) {
        self.handlers.insert(target, handler);
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs the loop on a new thread named `deskshare-dispatch`.
    ///
    /// The generation is claimed before this returns, so any loop started
    /// earlier is already superseded.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<JoinHandle<LoopExit>> {
        let generation = self.generation.claim();
        thread::Builder::new()
            .name("deskshare-dispatch".to_string())
            .spawn(move || self.run_as(generation))
    }

    /// Runs the loop on the calling thread until it exits.
    pub fn run(self) -> LoopExit {
        let generation = self.generation.claim();
        self.run_as(generation)
    }

    fn run_as(mut self, generation: u64) -> LoopExit {
        let _cleanup = StopScreenOnExit(Arc::clone(&self.screen));
        info!(generation, "dispatch loop started");

        let exit = loop {
            if !self.generation.is_current(generation) {
                break LoopExit::Superseded;
            }
            let event = match self.queue.get(Some(self.poll_interval)) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(_) => break LoopExit::QueueClosed,
            };
            if let Some(exit) = self.dispatch(event) {
                break exit;
            }
        };

        info!(generation, ?exit, "dispatch loop finished");
        exit
    }

    /// Processes one event.  Returns `Some` when the loop must stop.
    fn dispatch(&mut self, event: Event) -> Option<LoopExit> {
        trace!(event_type = ?event.event_type(), to = ?event.target, "dispatching");
        match event.payload {
            EventPayload::Quit => return Some(LoopExit::Quit),
            EventPayload::ReconnectEnabled => {
                self.reconnect.set(true);
                info!("auto-reconnect enabled");
                self.observer.on_reconnect_enabled();
            }
            EventPayload::ReconnectDisabled => {
                self.reconnect.set(false);
                info!("auto-reconnect disabled");
                self.observer.on_reconnect_disabled();
            }
            _ => {
                let Some(handler) = self.handlers.get_mut(&event.target) else {
                    debug!(to = ?event.target, "no handler registered; event dropped");
                    return None;
                };
                match handler.handle(event) {
                    Ok(()) => {}
                    Err(e) if e.is_unrecoverable() => {
                        error!("{e}");
                        return Some(LoopExit::Failed(e));
                    }
                    Err(e) => warn!("event dropped: {e}"),
                }
            }
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
