//! Recording screen for tests.
//!
//! `MockScreen` performs no platform calls.  Every injected action is pushed
//! into a `Mutex<Vec<_>>` so assertions can inspect exactly what was injected
//! and in what order, even when the screen is shared with the dispatch thread.
//!
//! # Failure switches
//!
//! Set `fail` to make every `inject` return [`InjectionError::Failed`], or
//! `unavailable` to make it return [`InjectionError::Unavailable`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::application::inject_input::{InjectionError, InputAction, Screen, ScreenShape};

/// A screen that records calls.
pub struct MockScreen {
    /// Every action passed to `inject`, in order.  Failed injections are not
    /// recorded.
    pub actions: Mutex<Vec<InputAction>>,
    pub shape: Mutex<ScreenShape>,
    pub fail: AtomicBool,
    pub unavailable: AtomicBool,
    stops: AtomicUsize,
}

impl MockScreen {
    pub fn new(shape: ScreenShape) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            shape: Mutex::new(shape),
            fail: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
        }
    }

    /// A snapshot of the recorded actions.
    pub fn actions(&self) -> Vec<InputAction> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times `stop` was called.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for MockScreen {
    fn default() -> Self {
        Self::new(ScreenShape::new(1920, 1080))
    }
}

impl Screen for MockScreen {
    fn set_shape(&self, shape: ScreenShape) {
        *self.shape.lock().unwrap_or_else(PoisonError::into_inner) = shape;
    }

    fn shape(&self) -> ScreenShape {
        *self.shape.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inject(&self, action: &InputAction) -> Result<(), InjectionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(InjectionError::Unavailable("mock unavailable".into()));
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(InjectionError::Failed("mock failure".into()));
        }
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action.clone());
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
