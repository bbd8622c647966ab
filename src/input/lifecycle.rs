use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::{
    config::{InputConfig, check_unit},
    content::{ContentBinding, ContentElement, ContentRegistry},
    error::{ErrorDetail, InputError},
    events::{EventBus, InputDetail, InputEvent, PoseDetail},
    transform::scalemap,
    types::InputType,
    vec2::{self, Vec2},
};

// Closer than this and smoothing snaps to the sample.
const SNAP_DISTANCE: f32 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputState {
    Idle,
    Initializing,
    Ready,
    Stopped,
    Error,
}

/// State and event plumbing shared by every input source.
///
/// `position` is normalized to `[-1, 1]` on both axes, `target_position` is
/// in content-element pixels. Both chase the last raw samples
/// (`last_found_*`) on every tick.
#[derive(Debug)]
pub struct InputCore {
    input_type: InputType,
    state: InputState,
    aborted: bool,
    has_ticked_since_ready: bool,
    smoothing: f32,
    disable_clamp: bool,
    controls: bool,
    selected: bool,
    position: Vec2,
    target_position: Vec2,
    last_found_position: Vec2,
    last_found_target_position: Vec2,
    content: ContentBinding,
    pose_detail: Option<PoseDetail>,
    events: EventBus,
}

impl InputCore {
    pub fn new(
        input_type: InputType,
        config: &InputConfig,
        registry: Option<Arc<ContentRegistry>>,
    ) -> Result<Self, InputError> {
        config.validate()?;
        Ok(Self {
            input_type,
            state: InputState::Idle,
            aborted: false,
            has_ticked_since_ready: false,
            smoothing: config.smoothing,
            disable_clamp: config.disable_clamp,
            controls: false,
            selected: false,
            position: Vec2::new(-1.0, -1.0),
            target_position: Vec2::ZERO,
            last_found_position: Vec2::new(-1.0, -1.0),
            last_found_target_position: Vec2::ZERO,
            content: ContentBinding::new(registry, config.content_selector.clone()),
            pose_detail: None,
            events: EventBus::new(),
        })
    }

    pub fn input_type(&self) -> InputType {
        self.input_type
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == InputState::Ready
    }

    pub fn is_initializing(&self) -> bool {
        self.state == InputState::Initializing
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    pub fn clear_aborted(&mut self) {
        self.aborted = false;
    }

    pub fn can_initialize(&self) -> bool {
        !self.aborted && self.state != InputState::Initializing
    }

    pub fn has_ticked_since_ready(&self) -> bool {
        self.has_ticked_since_ready
    }

    pub fn subscribe(&mut self) -> Receiver<InputEvent> {
        self.events.subscribe()
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    /// Rejected values leave the previous smoothing in place.
    pub fn set_smoothing(&mut self, smoothing: f32) -> Result<(), InputError> {
        check_unit("smoothing", smoothing)?;
        if self.smoothing != smoothing {
            self.smoothing = smoothing;
            self.dispatch_change();
        }
        Ok(())
    }

    pub fn disable_clamp(&self) -> bool {
        self.disable_clamp
    }

    pub fn set_disable_clamp(&mut self, disable: bool) {
        if self.disable_clamp != disable {
            self.disable_clamp = disable;
            self.dispatch_change();
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn target_position(&self) -> Vec2 {
        self.target_position
    }

    pub fn last_found_position(&self) -> Vec2 {
        self.last_found_position
    }

    pub fn last_found_target_position(&self) -> Vec2 {
        self.last_found_target_position
    }

    pub fn set_last_found_position(&mut self, position: Vec2) {
        self.last_found_position = position;
    }

    pub fn set_last_found_target_position(&mut self, target: Vec2) {
        self.last_found_target_position = target;
    }

    pub fn pose_detail(&self) -> Option<&PoseDetail> {
        self.pose_detail.as_ref()
    }

    pub fn set_pose_detail(&mut self, detail: Option<PoseDetail>) {
        self.pose_detail = detail;
    }

    pub fn content_selector(&self) -> &str {
        self.content.selector()
    }

    pub fn set_content_selector(&mut self, selector: impl Into<String>) -> bool {
        self.content.set_selector(selector)
    }

    pub fn set_content_element(&mut self, element: Option<&Arc<ContentElement>>) -> bool {
        self.content.set_element(element)
    }

    pub fn content_element(&mut self) -> Option<Arc<ContentElement>> {
        self.content.resolve()
    }

    pub fn controls(&self) -> bool {
        self.controls
    }

    pub fn set_controls(&mut self, open: bool) {
        if self.controls == open {
            return;
        }
        self.controls = open;
        let detail = self.detail();
        self.events.emit(if open {
            InputEvent::ControlsOpen(detail)
        } else {
            InputEvent::ControlsClose(detail)
        });
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    /// Returns the previous value.
    pub fn set_selected(&mut self, selected: bool) -> bool {
        std::mem::replace(&mut self.selected, selected)
    }

    pub fn detail(&self) -> InputDetail {
        InputDetail {
            input_type: self.input_type,
            position: self.position,
            pose: self.pose_detail.clone(),
        }
    }

    pub fn dispatch_initializing(&mut self) {
        self.state = InputState::Initializing;
        let detail = self.detail();
        self.events.emit(InputEvent::Initializing(detail));
    }

    pub fn dispatch_ready(&mut self) {
        self.state = InputState::Ready;
        self.has_ticked_since_ready = false;
        let detail = self.detail();
        self.events.emit(InputEvent::Ready(detail));
    }

    pub fn dispatch_stop(&mut self) {
        if self.state == InputState::Initializing {
            self.aborted = true;
        }
        self.state = InputState::Stopped;
        let detail = self.detail();
        self.events.emit(InputEvent::Stop(detail));
    }

    pub fn dispatch_change(&mut self) {
        let detail = self.detail();
        self.events.emit(InputEvent::Change(detail));
    }

    pub fn fail(&mut self, err: &InputError) {
        log::error!("{} input failed: {err:#}", self.input_type);
        self.state = InputState::Error;
        self.events.emit(InputEvent::Error(ErrorDetail::from(err)));
    }

    /// Advance one frame. Emits `input` when the position moved or the caller
    /// has another reason, then always `tick`.
    pub fn tick(&mut self, extra_reason: bool) -> bool {
        let dispatch_input = self.step_towards_target() || extra_reason;
        if dispatch_input {
            let detail = self.detail();
            self.events.emit(InputEvent::Input(detail));
        }
        let detail = self.detail();
        self.events.emit(InputEvent::Tick(detail));
        self.has_ticked_since_ready = true;
        dispatch_input
    }

    pub fn step_towards_target(&mut self) -> bool {
        if vec2::equal(self.position, self.last_found_position) {
            return false;
        }

        let snap = self.smoothing == 0.0
            || !self.has_ticked_since_ready
            || vec2::distance(self.position, self.last_found_position) < SNAP_DISTANCE;
        if snap {
            self.position = self.last_found_position;
            self.target_position = self.last_found_target_position;
        } else {
            let ease = scalemap(self.smoothing, 0.0, 1.0, 0.95, 0.0);
            let step = (self.last_found_position - self.position) * ease;
            vec2::add(self.position, step, Some(&mut self.position));
            let step = (self.last_found_target_position - self.target_position) * ease;
            vec2::add(self.target_position, step, Some(&mut self.target_position));
        }
        true
    }

    fn content_dimensions(&mut self) -> Result<Vec2, InputError> {
        let element = self.content_element().ok_or(InputError::NoContentElement)?;
        let dims = element.dimensions();
        if dims.x > 0.0 && dims.y > 0.0 {
            Ok(dims)
        } else {
            Err(InputError::Coordinate {
                width: dims.x,
                height: dims.y,
            })
        }
    }

    /// Feed a raw target in content pixels and tick.
    pub fn set_target_position(&mut self, target: Vec2) -> Result<(), InputError> {
        let dims = self.content_dimensions()?;
        self.last_found_target_position = target;
        self.last_found_position = Vec2::new(
            scalemap(target.x, 0.0, dims.x, -1.0, 1.0),
            scalemap(target.y, 0.0, dims.y, -1.0, 1.0),
        );
        self.tick(false);
        Ok(())
    }

    /// Feed a raw normalized position and tick.
    pub fn set_position(&mut self, position: Vec2) -> Result<(), InputError> {
        let dims = self.content_dimensions()?;
        self.last_found_position = position;
        self.last_found_target_position = Vec2::new(
            scalemap(position.x, -1.0, 1.0, 0.0, dims.x),
            scalemap(position.y, -1.0, 1.0, 0.0, dims.y),
        );
        self.tick(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Bounds;
    use proptest::prelude::*;

    fn core_with(smoothing: f32) -> InputCore {
        let config = InputConfig {
            smoothing,
            ..InputConfig::default()
        };
        InputCore::new(InputType::Mouse, &config, None).unwrap()
    }

    fn names(rx: &Receiver<InputEvent>) -> Vec<&'static str> {
        rx.try_iter().map(|e| e.name()).collect()
    }

    #[test]
    fn first_tick_after_ready_snaps_exactly() {
        let mut core = core_with(0.9);
        core.dispatch_ready();
        core.set_last_found_position(Vec2::new(0.25, -0.5));
        core.set_last_found_target_position(Vec2::new(300.0, 100.0));

        assert!(core.tick(false));
        assert_eq!(core.position(), Vec2::new(0.25, -0.5));
        assert_eq!(core.target_position(), Vec2::new(300.0, 100.0));
    }

    #[test]
    fn smoothing_converges_without_overshoot() {
        let mut core = core_with(0.5);
        core.dispatch_ready();
        core.set_last_found_position(Vec2::new(0.4, -0.2));
        core.tick(false);

        core.set_last_found_position(Vec2::ZERO);
        let mut previous = core.position();
        let mut settled = false;
        for _ in 0..100 {
            if !core.tick(false) {
                settled = true;
                break;
            }
            let p = core.position();
            assert!(p.x >= 0.0 && p.x <= previous.x);
            assert!(p.y <= 0.0 && p.y >= previous.y);
            previous = p;
        }
        assert!(settled);
        assert_eq!(core.position(), Vec2::ZERO);
    }

    #[test]
    fn tick_emits_input_before_tick() {
        let mut core = core_with(0.0);
        let rx = core.subscribe();
        core.dispatch_ready();
        core.set_last_found_position(Vec2::new(0.1, 0.1));
        core.tick(false);
        core.tick(false);
        core.tick(true);
        assert_eq!(names(&rx), ["ready", "input", "tick", "tick", "input", "tick"]);
    }

    #[test]
    fn stop_while_initializing_aborts() {
        let mut core = core_with(0.0);
        let rx = core.subscribe();
        core.dispatch_initializing();
        assert!(!core.can_initialize());
        core.dispatch_stop();
        assert!(core.aborted());
        assert!(!core.can_initialize());
        assert_eq!(core.state(), InputState::Stopped);
        core.clear_aborted();
        assert!(core.can_initialize());
        assert_eq!(names(&rx), ["initializing", "stop"]);
    }

    #[test]
    fn stop_after_ready_is_not_an_abort() {
        let mut core = core_with(0.0);
        core.dispatch_ready();
        core.dispatch_stop();
        assert!(!core.aborted());
        assert!(core.can_initialize());
    }

    #[test]
    fn fail_emits_error_and_allows_retry() {
        let mut core = core_with(0.0);
        let rx = core.subscribe();
        core.dispatch_initializing();
        core.fail(&InputError::NoDevice);
        assert_eq!(core.state(), InputState::Error);
        assert!(core.can_initialize());
        let events: Vec<_> = rx.try_iter().collect();
        match events.last() {
            Some(InputEvent::Error(detail)) => assert_eq!(detail.name, "NoDeviceError"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn controls_emit_on_change_only() {
        let mut core = core_with(0.0);
        let rx = core.subscribe();
        core.set_controls(true);
        core.set_controls(true);
        core.set_controls(false);
        assert_eq!(names(&rx), ["controlsopen", "controlsclose"]);
    }

    #[test]
    fn target_and_position_are_derived_from_each_other() {
        let registry = ContentRegistry::new();
        registry.insert(ContentElement::new("#c", Bounds::new(0.0, 0.0, 200.0, 100.0)));
        let config = InputConfig {
            content_selector: "#c".into(),
            ..InputConfig::default()
        };
        let mut core = InputCore::new(InputType::Mouse, &config, Some(registry)).unwrap();
        core.dispatch_ready();

        core.set_target_position(Vec2::new(150.0, 25.0)).unwrap();
        assert_eq!(core.position(), Vec2::new(0.5, -0.5));

        core.set_position(Vec2::new(-1.0, 1.0)).unwrap();
        assert_eq!(core.target_position(), Vec2::new(0.0, 100.0));
    }

    #[test]
    fn projection_needs_a_sized_element() {
        let mut core = core_with(0.0);
        assert!(matches!(
            core.set_target_position(Vec2::ZERO),
            Err(InputError::NoContentElement)
        ));

        let element = ContentElement::new("#z", Bounds::new(0.0, 0.0, 0.0, 10.0));
        core.set_content_element(Some(&element));
        assert!(matches!(
            core.set_position(Vec2::ZERO),
            Err(InputError::Coordinate { .. })
        ));
    }

    proptest! {
        #[test]
        fn out_of_range_smoothing_is_ignored(value in prop_oneof![-10.0f32..-0.001, 1.001f32..10.0]) {
            let mut core = core_with(0.3);
            prop_assert!(core.set_smoothing(value).is_err());
            prop_assert_eq!(core.smoothing(), 0.3);
        }

        #[test]
        fn in_range_smoothing_is_kept(value in 0.0f32..=1.0) {
            let mut core = core_with(0.0);
            prop_assert!(core.set_smoothing(value).is_ok());
            prop_assert_eq!(core.smoothing(), value);
        }
    }
}
