pub mod frame_loop;
pub mod lifecycle;
pub mod mouse;
pub mod pose;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;

use crate::{error::InputError, events::InputEvent, vec2::Vec2};

pub use lifecycle::{InputCore, InputState};
pub use mouse::{MouseInput, PointerMode};
pub use pose::PoseInput;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    Submitted,
    Skipped,
    NoFrame,
}

/// Cross-thread request to stop an input, honored during initialization
/// checkpoints and on the next update.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn take_request(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub trait InputSource {
    fn core(&self) -> &InputCore;
    fn core_mut(&mut self) -> &mut InputCore;

    /// Blocks until the input is ready or has failed.
    fn initialize(&mut self) -> Result<(), InputError>;
    /// Drive the input from the host loop.
    fn update(&mut self, now: Instant) -> Result<(), InputError>;
    fn stop(&mut self);

    /// How long the host may sleep before the next update is useful.
    fn time_until_next_frame(&self, now: Instant) -> Duration;

    fn subscribe(&mut self) -> Receiver<InputEvent> {
        self.core_mut().subscribe()
    }

    fn state(&self) -> InputState {
        self.core().state()
    }

    fn position(&self) -> Vec2 {
        self.core().position()
    }

    fn target_position(&self) -> Vec2 {
        self.core().target_position()
    }

    fn set_smoothing(&mut self, smoothing: f32) -> Result<(), InputError> {
        self.core_mut().set_smoothing(smoothing)
    }

    fn set_controls(&mut self, open: bool) {
        self.core_mut().set_controls(open);
    }

    /// Selecting starts the input, deselecting stops it.
    fn set_selected(&mut self, selected: bool) -> Result<(), InputError> {
        let was_selected = self.core_mut().set_selected(selected);
        match (was_selected, selected) {
            (false, true) => {
                let result = self.initialize();
                if result.is_err() {
                    self.core_mut().set_selected(false);
                }
                result
            }
            (true, false) => {
                self.stop();
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Either input, chosen at runtime.
pub enum InputKind {
    Mouse(MouseInput),
    Pose(Box<PoseInput>),
}

impl InputKind {
    pub fn source(&self) -> &dyn InputSource {
        match self {
            InputKind::Mouse(input) => input,
            InputKind::Pose(input) => input.as_ref(),
        }
    }

    pub fn source_mut(&mut self) -> &mut dyn InputSource {
        match self {
            InputKind::Mouse(input) => input,
            InputKind::Pose(input) => input.as_mut(),
        }
    }
}
