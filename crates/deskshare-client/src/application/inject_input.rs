//! InjectInputUseCase: turns decoded server messages into local input.
//!
//! This use case sits at the application layer and delegates the actual
//! platform effect to a [`Screen`] trait object.  Concrete screens live in
//! the infrastructure layer.

use std::sync::Arc;

use deskshare_core::protocol::messages::{EnterMessage, Message, ModifierMask};
use thiserror::Error;
use tracing::{debug, trace};

use crate::application::dispatch::{DispatchError, EventHandler};
use crate::application::events::{Event, EventPayload};

/// Error type for input injection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InjectionError {
    /// One action could not be injected.  The action is dropped and the
    /// session continues.
    #[error("injection failed: {0}")]
    Failed(String),
    /// The injection backend is gone.  Nothing more can be injected.
    #[error("injection backend unavailable: {0}")]
    Unavailable(String),
}

/// Width and height of the local screen in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenShape {
    pub width: u16,
    pub height: u16,
}

impl ScreenShape {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Clamps `(x, y)` to the pixel grid `[0, width) × [0, height)`.
    pub fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        let max_x = i32::from(self.width.max(1)) - 1;
        let max_y = i32::from(self.height.max(1)) - 1;
        (x.clamp(0, max_x), y.clamp(0, max_y))
    }

    /// Pixel at the centre of the screen.
    pub fn centre(&self) -> (i32, i32) {
        (i32::from(self.width / 2), i32::from(self.height / 2))
    }
}

/// High-level input action handed to a [`Screen`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// The server's cursor entered this screen at `(x, y)` with `mask` held.
    Enter { x: i32, y: i32, mask: ModifierMask },
    /// The cursor left this screen.
    Leave,
    KeyDown { id: u16, mask: ModifierMask, button: u16 },
    KeyUp { id: u16, mask: ModifierMask, button: u16 },
    KeyRepeat {
        id: u16,
        mask: ModifierMask,
        count: u16,
        button: u16,
    },
    /// Absolute pointer position, already clamped to the screen.
    MouseMove { x: i32, y: i32 },
    MouseButton { button: u8, pressed: bool },
    MouseWheel { x_delta: i16, y_delta: i16 },
}

/// A local surface that can receive injected input and report its geometry.
///
/// Called from the dispatch thread.  Implementations must not block
/// indefinitely.
pub trait Screen: Send + Sync {
    /// Records the geometry used to clamp incoming coordinates.
    fn set_shape(&self, shape: ScreenShape);

    fn shape(&self) -> ScreenShape;

    /// Performs the platform effect for one action.
    ///
    /// # Errors
    ///
    /// [`InjectionError::Failed`] when this action could not be injected,
    /// [`InjectionError::Unavailable`] when no further action can be.
    fn inject(&self, action: &InputAction) -> Result<(), InjectionError>;

    /// Releases the injection subsystem.  Idempotent.
    fn stop(&self);
}

/// Filters duplicate consecutive pointer positions.
#[derive(Default)]
struct DedupFilter {
    last_mouse_pos: Option<(i32, i32)>,
}

impl DedupFilter {
    fn should_send_mouse_move(&mut self, x: i32, y: i32) -> bool {
        if self.last_mouse_pos == Some((x, y)) {
            return false;
        }
        self.last_mouse_pos = Some((x, y));
        true
    }

    fn reset(&mut self) {
        self.last_mouse_pos = None;
    }
}

/// The Inject Input use case.
///
/// Input is only injected between an ENTER and the following LEAVE; anything
/// outside that window is dropped.
pub struct InjectInputUseCase {
    screen: Arc<dyn Screen>,
    dedup: DedupFilter,
    entered: bool,
    /// Keys pressed and not yet released, as `(id, button)` in press order.
    held_keys: Vec<(u16, u16)>,
    /// Mouse buttons pressed and not yet released.
    held_buttons: Vec<u8>,
}

impl InjectInputUseCase {
    pub fn new(screen: Arc<dyn Screen>) -> Self {
        Self {
            screen,
            dedup: DedupFilter::default(),
            entered: false,
            held_keys: Vec::new(),
            held_buttons: Vec::new(),
        }
    }

    /// Returns `true` between ENTER and LEAVE.
    pub fn is_entered(&self) -> bool {
        self.entered
    }

    /// Handles one decoded message.
    ///
    /// Non-input messages are ignored.
    ///
    /// # Errors
    ///
    /// Whatever the [`Screen`] returns for the resulting action.
    pub fn handle(&mut self, msg: &Message) -> Result<(), InjectionError> {
        let action = match msg {
            Message::Enter(enter) => Some(self.enter(enter)),
            Message::Leave => self.leave(),
            _ if !msg.is_input() => {
                trace!(kind = ?msg.message_type(), "not an input message; ignored");
                None
            }
            _ if !self.entered => {
                debug!(kind = ?msg.message_type(), "input outside enter/leave; dropped");
                None
            }
            Message::KeyDown(key) => Some(InputAction::KeyDown {
                id: key.id,
                mask: key.modifiers(),
                button: key.button,
            }),
            Message::KeyUp(key) => Some(InputAction::KeyUp {
                id: key.id,
                mask: key.modifiers(),
                button: key.button,
            }),
            Message::KeyRepeat(key) => Some(InputAction::KeyRepeat {
                id: key.id,
                mask: ModifierMask(key.mask),
                count: key.count,
                button: key.button,
            }),
            Message::MouseMove(pos) => {
                let (x, y) = self
                    .screen
                    .shape()
                    .clamp(i32::from(pos.x), i32::from(pos.y));
                self.dedup
                    .should_send_mouse_move(x, y)
                    .then_some(InputAction::MouseMove { x, y })
            }
            Message::MouseButton(button) => Some(InputAction::MouseButton {
                button: button.button,
                pressed: button.pressed,
            }),
            Message::MouseWheel(wheel) => Some(InputAction::MouseWheel {
                x_delta: wheel.x_delta,
                y_delta: wheel.y_delta,
            }),
            _ => None,
        };

        let Some(action) = action else {
            return Ok(());
        };
        self.screen.inject(&action)?;
        self.track(&action);
        Ok(())
    }

    fn track(&mut self, action: &InputAction) {
        match *action {
            InputAction::KeyDown { id, button, .. } => {
                if !self.held_keys.iter().any(|&(_, b)| b == button) {
                    self.held_keys.push((id, button));
                }
            }
            InputAction::KeyUp { button, .. } => self.held_keys.retain(|&(_, b)| b != button),
            InputAction::MouseButton { button, pressed: true } => {
                if !self.held_buttons.contains(&button) {
                    self.held_buttons.push(button);
                }
            }
            InputAction::MouseButton { button, pressed: false } => {
                self.held_buttons.retain(|&b| b != button)
            }
            _ => {}
        }
    }

    /// Ends the current session's input: releases held keys and buttons,
    /// leaves the screen if entered, then resets.
    ///
    /// # Errors
    ///
    /// The first injection error.  State is reset regardless.
    pub fn end_session(&mut self) -> Result<(), InjectionError> {
        let mut release = Vec::new();
        if self.entered {
            release.extend(self.held_keys.iter().rev().map(|&(id, button)| {
                InputAction::KeyUp {
                    id,
                    mask: ModifierMask::default(),
                    button,
                }
            }));
            release.extend(
                self.held_buttons
                    .iter()
                    .rev()
                    .map(|&button| InputAction::MouseButton {
                        button,
                        pressed: false,
                    }),
            );
            release.push(InputAction::Leave);
            debug!(actions = release.len(), "session ended while entered; releasing");
        }
        self.reset();

        let mut first_error = None;
        for action in &release {
            if let Err(e) = self.screen.inject(action) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn enter(&mut self, enter: &EnterMessage) -> InputAction {
        self.reset();
        self.entered = true;
        let (x, y) = self
            .screen
            .shape()
            .clamp(i32::from(enter.x), i32::from(enter.y));
        debug!(x, y, seq = enter.sequence_number, "cursor entered screen");
        InputAction::Enter {
            x,
            y,
            mask: enter.modifiers(),
        }
    }

    fn leave(&mut self) -> Option<InputAction> {
        if !self.entered {
            debug!("leave without enter; dropped");
            return None;
        }
        self.entered = false;
        self.dedup.reset();
        debug!("cursor left screen");
        Some(InputAction::Leave)
    }

    /// Forgets enter state, held input and the last pointer position.
    pub fn reset(&mut self) {
        self.entered = false;
        self.dedup.reset();
        self.held_keys.clear();
        self.held_buttons.clear();
    }
}

fn dispatch_error(e: InjectionError) -> DispatchError {
    match e {
        InjectionError::Failed(_) => DispatchError::Handler(e.to_string()),
        InjectionError::Unavailable(_) => DispatchError::Unrecoverable(e.to_string()),
    }
}

impl EventHandler for InjectInputUseCase {
    fn handle(&mut self, event: Event) -> Result<(), DispatchError> {
        match event.payload {
            EventPayload::Message(msg) => {
                InjectInputUseCase::handle(self, &msg).map_err(dispatch_error)
            }
            EventPayload::SessionEnded => self.end_session().map_err(dispatch_error),
            other => {
                trace!(payload = ?other, "screen handler ignores non-message event");
                Ok(())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use deskshare_core::protocol::messages::{
        KeyMessage, MouseButtonMessage, MouseMoveMessage, MouseWheelMessage,
    };
    use std::sync::Mutex;

    // ── Recording screen ──────────────────────────────────────────────────────

    struct RecordingScreen {
        shape: Mutex<ScreenShape>,
        actions: Mutex<Vec<InputAction>>,
        failure: Option<InjectionError>,
    }

    impl RecordingScreen {
        fn new(failure: Option<InjectionError>) -> Self {
            Self {
                shape: Mutex::new(ScreenShape::new(1920, 1080)),
                actions: Mutex::new(Vec::new()),
                failure,
            }
        }
    }

    impl Screen for RecordingScreen {
        fn set_shape(&self, shape: ScreenShape) {
            *self.shape.lock().unwrap() = shape;
        }

        fn shape(&self) -> ScreenShape {
            *self.shape.lock().unwrap()
        }

        fn inject(&self, action: &InputAction) -> Result<(), InjectionError> {
            if let Some(e) = &self.failure {
                return Err(e.clone());
            }
            self.actions.lock().unwrap().push(action.clone());
            Ok(())
        }

        fn stop(&self) {}
    }

    fn make_use_case() -> (InjectInputUseCase, Arc<RecordingScreen>) {
        let screen = Arc::new(RecordingScreen::new(None));
        let uc = InjectInputUseCase::new(Arc::clone(&screen) as Arc<dyn Screen>);
        (uc, screen)
    }

    fn enter_at(x: i16, y: i16) -> Message {
        Message::Enter(EnterMessage {
            x,
            y,
            sequence_number: 1,
            mask: 0,
        })
    }

    fn key_down(id: u16) -> Message {
        Message::KeyDown(KeyMessage {
            id,
            mask: 0,
            button: 0x26,
        })
    }

    // ── Enter / leave gating ──────────────────────────────────────────────────

    #[test]
    fn test_input_before_enter_is_dropped() {
        // Arrange
        let (mut uc, screen) = make_use_case();

        // Act
        uc.handle(&key_down(0x61)).unwrap();
        uc.handle(&Message::MouseMove(MouseMoveMessage { x: 5, y: 5 })).unwrap();

        // Assert
        assert!(screen.actions.lock().unwrap().is_empty());
        assert!(!uc.is_entered());
    }

    #[test]
    fn test_enter_then_key_is_injected_in_order() {
        // Arrange
        let (mut uc, screen) = make_use_case();

        // Act
        uc.handle(&enter_at(10, 20)).unwrap();
        uc.handle(&key_down(0x61)).unwrap();

        // Assert
        assert_eq!(
            *screen.actions.lock().unwrap(),
            vec![
                InputAction::Enter {
                    x: 10,
                    y: 20,
                    mask: ModifierMask(0)
                },
                InputAction::KeyDown {
                    id: 0x61,
                    mask: ModifierMask(0),
                    button: 0x26
                },
            ]
        );
    }

    #[test]
    fn test_input_after_leave_is_dropped() {
        // Arrange
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.handle(&Message::Leave).unwrap();

        // Act
        uc.handle(&key_down(0x62)).unwrap();

        // Assert
        let actions = screen.actions.lock().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1], InputAction::Leave);
    }

    #[test]
    fn test_leave_without_enter_is_dropped() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&Message::Leave).unwrap();
        assert!(screen.actions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_non_input_messages_are_ignored() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.handle(&Message::KeepAlive).unwrap();
        uc.handle(&Message::InfoAck).unwrap();
        assert_eq!(screen.actions.lock().unwrap().len(), 1);
    }

    // ── Clamping ──────────────────────────────────────────────────────────────

    #[test]
    fn test_enter_coordinates_are_clamped_to_shape() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(-40, 5000)).unwrap();
        assert_eq!(
            screen.actions.lock().unwrap()[0],
            InputAction::Enter {
                x: 0,
                y: 1079,
                mask: ModifierMask(0)
            }
        );
    }

    #[test]
    fn test_mouse_move_is_clamped_to_updated_shape() {
        // Arrange
        let (mut uc, screen) = make_use_case();
        screen.set_shape(ScreenShape::new(800, 600));
        uc.handle(&enter_at(0, 0)).unwrap();

        // Act
        uc.handle(&Message::MouseMove(MouseMoveMessage { x: 900, y: 300 }))
            .unwrap();

        // Assert
        assert_eq!(
            screen.actions.lock().unwrap()[1],
            InputAction::MouseMove { x: 799, y: 300 }
        );
    }

    // ── Dedup ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_identical_consecutive_moves_are_deduplicated() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();
        let mv = Message::MouseMove(MouseMoveMessage { x: 100, y: 200 });
        uc.handle(&mv).unwrap();
        uc.handle(&mv).unwrap();
        assert_eq!(screen.actions.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_moves_clamped_to_same_pixel_are_deduplicated() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.handle(&Message::MouseMove(MouseMoveMessage { x: 3000, y: 10 }))
            .unwrap();
        uc.handle(&Message::MouseMove(MouseMoveMessage { x: 4000, y: 10 }))
            .unwrap();
        assert_eq!(screen.actions.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_reenter_resets_dedup_state() {
        // Arrange
        let (mut uc, screen) = make_use_case();
        let mv = Message::MouseMove(MouseMoveMessage { x: 7, y: 7 });
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.handle(&mv).unwrap();
        uc.handle(&Message::Leave).unwrap();

        // Act
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.handle(&mv).unwrap();

        // Assert: enter, move, leave, enter, move
        assert_eq!(screen.actions.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_reset_leaves_the_screen() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.reset();
        uc.handle(&key_down(1)).unwrap();
        assert!(!uc.is_entered());
        assert_eq!(screen.actions.lock().unwrap().len(), 1);
    }

    // ── Session end ───────────────────────────────────────────────────────────

    #[test]
    fn test_session_end_releases_held_input_and_leaves() {
        // Arrange
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(10, 10)).unwrap();
        uc.handle(&key_down(0x61)).unwrap();
        uc.handle(&Message::KeyDown(KeyMessage {
            id: 0x62,
            mask: 0,
            button: 0x38,
        }))
        .unwrap();
        uc.handle(&Message::KeyUp(KeyMessage {
            id: 0x62,
            mask: 0,
            button: 0x38,
        }))
        .unwrap();
        uc.handle(&Message::MouseButton(MouseButtonMessage {
            button: 1,
            pressed: true,
        }))
        .unwrap();
        screen.actions.lock().unwrap().clear();

        // Act
        uc.end_session().unwrap();

        // Assert
        assert_eq!(
            *screen.actions.lock().unwrap(),
            vec![
                InputAction::KeyUp {
                    id: 0x61,
                    mask: ModifierMask(0),
                    button: 0x26
                },
                InputAction::MouseButton {
                    button: 1,
                    pressed: false
                },
                InputAction::Leave,
            ]
        );
        assert!(!uc.is_entered());
    }

    #[test]
    fn test_input_after_session_end_waits_for_new_enter() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.end_session().unwrap();
        screen.actions.lock().unwrap().clear();

        uc.handle(&Message::MouseMove(MouseMoveMessage { x: 50, y: 50 }))
            .unwrap();

        assert!(screen.actions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_session_end_outside_enter_injects_nothing() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.handle(&Message::Leave).unwrap();
        screen.actions.lock().unwrap().clear();

        uc.end_session().unwrap();

        assert!(screen.actions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_session_end_event_is_handled_by_screen_handler() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();

        EventHandler::handle(&mut uc, Event::session_ended()).unwrap();

        assert_eq!(screen.actions.lock().unwrap().last(), Some(&InputAction::Leave));
        assert!(!uc.is_entered());
    }

    // ── Buttons and wheel ─────────────────────────────────────────────────────

    #[test]
    fn test_button_and_wheel_are_passed_through() {
        let (mut uc, screen) = make_use_case();
        uc.handle(&enter_at(0, 0)).unwrap();
        uc.handle(&Message::MouseButton(MouseButtonMessage {
            button: 3,
            pressed: true,
        }))
        .unwrap();
        uc.handle(&Message::MouseWheel(MouseWheelMessage {
            x_delta: 0,
            y_delta: -120,
        }))
        .unwrap();
        let actions = screen.actions.lock().unwrap();
        assert_eq!(
            actions[1],
            InputAction::MouseButton {
                button: 3,
                pressed: true
            }
        );
        assert_eq!(
            actions[2],
            InputAction::MouseWheel {
                x_delta: 0,
                y_delta: -120
            }
        );
    }

    // ── Error mapping ─────────────────────────────────────────────────────────

    #[test]
    fn test_failed_injection_maps_to_recoverable_dispatch_error() {
        let screen = Arc::new(RecordingScreen::new(Some(InjectionError::Failed(
            "busy".into(),
        ))));
        let mut uc = InjectInputUseCase::new(screen);
        let result = EventHandler::handle(&mut uc, Event::message(enter_at(0, 0)));
        assert!(matches!(result, Err(DispatchError::Handler(_))));
    }

    #[test]
    fn test_unavailable_backend_maps_to_unrecoverable_dispatch_error() {
        let screen = Arc::new(RecordingScreen::new(Some(InjectionError::Unavailable(
            "display closed".into(),
        ))));
        let mut uc = InjectInputUseCase::new(screen);
        let result = EventHandler::handle(&mut uc, Event::message(enter_at(0, 0)));
        assert!(matches!(result, Err(DispatchError::Unrecoverable(_))));
    }

    #[test]
    fn test_shape_centre() {
        assert_eq!(ScreenShape::new(1920, 1080).centre(), (960, 540));
    }
}
