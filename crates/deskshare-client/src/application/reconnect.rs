//! The auto-reconnect flag and the observer notified when it changes.
//!
//! The flag is shared between the dispatch thread, which flips it when a
//! `ReconnectEnabled` / `ReconnectDisabled` event is processed, and the
//! connection task, which reads it every time it has to decide whether to
//! retry.  The connection task never caches the value.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::application::events::ConnectionState;

/// Shared, observable auto-reconnect switch.
#[derive(Debug)]
pub struct AutoReconnect {
    enabled: AtomicBool,
    changed: Notify,
}

impl AutoReconnect {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            changed: Notify::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Stores `enabled` and wakes every task waiting in [`disabled`](Self::disabled).
    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    /// Completes once the flag is off.  Returns immediately if it already is.
    pub async fn disabled(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a `set(false)` in between is not missed.
            notified.as_mut().enable();
            if !self.is_enabled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for AutoReconnect {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Synchronous notifications for the UI collaborator.
///
/// Called on the dispatch thread; implementations must return quickly.
#[cfg_attr(test, mockall::automock)]
pub trait ReconnectObserver: Send + Sync {
    /// Auto-reconnect has just been switched on.
    fn on_reconnect_enabled(&self);

    /// Auto-reconnect has just been switched off.
    fn on_reconnect_disabled(&self);

    /// The connection changed state, or a diagnostic was raised in `state`.
    fn on_status(&self, state: ConnectionState, message: &str);
}
