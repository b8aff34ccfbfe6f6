//! Screen implementations.
//!
//! [`BasicScreen`] is the screen the binary runs with: it tracks the local
//! geometry and logs every action it is asked to inject against the
//! configured input device.  Platform injection backends plug in behind the
//! same [`Screen`] trait.

pub mod mock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::application::inject_input::{InjectionError, InputAction, Screen, ScreenShape};

/// A screen that logs injected input instead of performing it.
pub struct BasicScreen {
    device: String,
    shape: Mutex<ScreenShape>,
    stopped: AtomicBool,
}

impl BasicScreen {
    /// Creates a screen for `device` with the given geometry.
    ///
    /// An empty `device` means the default input device.
    pub fn new(device: impl Into<String>, shape: ScreenShape) -> Self {
        let device = device.into();
        info!(
            device = %display_device(&device),
            width = shape.width,
            height = shape.height,
            "screen ready"
        );
        Self {
            device,
            shape: Mutex::new(shape),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Screen for BasicScreen {
    fn set_shape(&self, shape: ScreenShape) {
        *self.shape.lock().unwrap_or_else(PoisonError::into_inner) = shape;
    }

    fn shape(&self) -> ScreenShape {
        *self.shape.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inject(&self, action: &InputAction) -> Result<(), InjectionError> {
        if self.is_stopped() {
            return Err(InjectionError::Unavailable(format!(
                "screen on {} is stopped",
                display_device(&self.device)
            )));
        }
        debug!(device = %display_device(&self.device), ?action, "inject");
        Ok(())
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            info!(device = %display_device(&self.device), "screen stopped");
        }
    }
}

fn display_device(device: &str) -> &str {
    if device.is_empty() {
        "default"
    } else {
        device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_can_be_replaced() {
        // Arrange
        let screen = BasicScreen::new("", ScreenShape::new(800, 600));

        // Act
        screen.set_shape(ScreenShape::new(1024, 768));

        // Assert
        assert_eq!(screen.shape(), ScreenShape::new(1024, 768));
    }

    #[test]
    fn test_inject_succeeds_until_stopped() {
        let screen = BasicScreen::new("/dev/input/event3", ScreenShape::new(800, 600));
        assert_eq!(screen.inject(&InputAction::Leave), Ok(()));

        screen.stop();

        assert!(screen.is_stopped());
        assert!(matches!(
            screen.inject(&InputAction::Leave),
            Err(InjectionError::Unavailable(_))
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let screen = BasicScreen::new("", ScreenShape::new(800, 600));
        screen.stop();
        screen.stop();
        assert!(screen.is_stopped());
    }

    #[test]
    fn test_device_is_kept() {
        let screen = BasicScreen::new("kbd0", ScreenShape::new(1, 1));
        assert_eq!(screen.device(), "kbd0");
    }
}
