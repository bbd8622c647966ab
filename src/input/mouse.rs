use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;

use super::{InputSource, frame_loop::FrameLoop, lifecycle::InputCore};
use crate::{
    config::MouseConfig,
    content::{ContentElement, ContentRegistry, ElementEvent, Key, PointerEvent, PointerKind},
    error::InputError,
    transform::{clamp, scalemap},
    types::InputType,
    vec2::Vec2,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerMode {
    Mouse,
    Keyboard,
    Touch,
}

/// Pointer and arrow-key input on the content element.
pub struct MouseInput {
    core: InputCore,
    config: MouseConfig,
    frame_loop: FrameLoop,
    mode: PointerMode,
    pressed: bool,
    last_dispatched_pressed: bool,
    listener: Option<Receiver<ElementEvent>>,
}

impl MouseInput {
    pub fn new(
        config: MouseConfig,
        registry: Option<Arc<ContentRegistry>>,
    ) -> Result<Self, InputError> {
        config.validate()?;
        let core = InputCore::new(InputType::Mouse, &config.input, registry)?;
        Ok(Self {
            core,
            config,
            frame_loop: FrameLoop::new(),
            mode: PointerMode::Mouse,
            pressed: false,
            last_dispatched_pressed: false,
            listener: None,
        })
    }

    pub fn mode(&self) -> PointerMode {
        self.mode
    }

    pub fn pressed(&self) -> bool {
        self.pressed
    }

    pub fn set_content_selector(&mut self, selector: impl Into<String>) {
        if self.core.set_content_selector(selector) {
            self.rebind();
        }
    }

    pub fn set_content_element(&mut self, element: Option<&Arc<ContentElement>>) {
        if self.core.set_content_element(element) {
            self.rebind();
        }
    }

    pub fn set_enable_keyboard(&mut self, enable: bool) {
        if self.config.enable_keyboard != enable {
            self.config.enable_keyboard = enable;
            self.core.dispatch_change();
        }
    }

    fn rebind(&mut self) {
        self.remove_listeners();
        if self.core.is_ready() || self.core.is_initializing() {
            self.add_listeners();
        }
    }

    fn add_listeners(&mut self) {
        if let Some(element) = self.core.content_element() {
            self.listener = Some(element.subscribe());
        }
    }

    fn remove_listeners(&mut self) {
        // Dropping the receiver unsubscribes on the element's next dispatch.
        self.listener = None;
    }

    fn drain_events(&mut self) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        let events: Vec<ElementEvent> = listener.try_iter().collect();
        for event in events {
            match event {
                ElementEvent::Pointer(pointer) => self.handle_pointer(pointer),
                ElementEvent::KeyDown(key) => self.handle_key(key),
            }
        }
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        let Some(element) = self.core.content_element() else {
            return;
        };

        if event.kind.is_touch() {
            self.mode = PointerMode::Touch;
            self.pressed = event.kind != PointerKind::TouchEnd;
        } else {
            self.mode = PointerMode::Mouse;
            self.pressed = event.buttons > 0;
        }

        let local = element.to_local(event.client);
        let dims = element.dimensions();
        if !local.is_finite() || dims.x <= 0.0 || dims.y <= 0.0 {
            return;
        }
        self.core.set_last_found_target_position(local);
        self.core.set_last_found_position(Vec2::new(
            scalemap(local.x, 0.0, dims.x, -1.0, 1.0),
            scalemap(local.y, 0.0, dims.y, -1.0, 1.0),
        ));
    }

    pub fn handle_key(&mut self, key: Key) {
        if !self.config.enable_keyboard {
            return;
        }
        let Some(element) = self.core.content_element() else {
            return;
        };
        let dims = element.dimensions();
        if dims.x <= 0.0 || dims.y <= 0.0 {
            return;
        }

        self.pressed = false;
        let amount = self.config.amplification;
        let (dx, dy) = match key {
            Key::ArrowLeft => (-1.0, 0.0),
            Key::ArrowRight => (1.0, 0.0),
            Key::ArrowUp => (0.0, -1.0),
            Key::ArrowDown => (0.0, 1.0),
            Key::Other => return,
        };

        let mut position = self.core.last_found_position();
        if !position.is_finite() {
            position = Vec2::ZERO;
        }
        let step = amount / dims.x.min(dims.y) * 2.0;
        position = position + Vec2::new(dx * step, dy * step);

        let mut target = self.core.last_found_target_position() + Vec2::new(dx * amount, dy * amount);
        if !self.core.disable_clamp() {
            target = Vec2::new(clamp(target.x, 0.0, dims.x), clamp(target.y, 0.0, dims.y));
        }

        self.mode = PointerMode::Keyboard;
        self.core.set_last_found_position(position);
        self.core.set_last_found_target_position(target);
    }

    /// A press or release counts as input even without movement.
    fn take_pressed_toggle(&mut self) -> bool {
        let toggled = self.pressed != self.last_dispatched_pressed;
        self.last_dispatched_pressed = self.pressed;
        toggled
    }
}

impl InputSource for MouseInput {
    fn core(&self) -> &InputCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut InputCore {
        &mut self.core
    }

    fn initialize(&mut self) -> Result<(), InputError> {
        if self.core.is_ready() {
            return Ok(());
        }
        self.core.dispatch_initializing();
        self.add_listeners();
        self.core.dispatch_ready();
        self.frame_loop.start();
        Ok(())
    }

    fn update(&mut self, now: Instant) -> Result<(), InputError> {
        if !self.core.is_ready() {
            return Ok(());
        }
        if self.listener.is_none() {
            self.add_listeners();
        }
        self.drain_events();
        if self.frame_loop.poll(now) {
            let toggled = self.take_pressed_toggle();
            self.core.tick(toggled);
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.remove_listeners();
        self.frame_loop.stop();
        self.core.dispatch_stop();
    }

    fn time_until_next_frame(&self, _now: Instant) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::Bounds,
        events::InputEvent,
        input::lifecycle::InputState,
    };

    fn setup(config: MouseConfig) -> (MouseInput, Arc<ContentElement>, Receiver<InputEvent>) {
        let registry = ContentRegistry::new();
        let element = ContentElement::new("#content", Bounds::new(100.0, 50.0, 200.0, 100.0));
        registry.insert(element.clone());
        let config = MouseConfig {
            input: crate::config::InputConfig {
                content_selector: "#content".into(),
                ..config.input
            },
            ..config
        };
        let mut input = MouseInput::new(config, Some(registry)).unwrap();
        let events = input.subscribe();
        input.initialize().unwrap();
        (input, element, events)
    }

    fn mouse(kind: PointerKind, x: f32, y: f32, buttons: u32) -> ElementEvent {
        ElementEvent::Pointer(PointerEvent {
            kind,
            client: Vec2::new(x, y),
            buttons,
        })
    }

    fn inputs(rx: &Receiver<InputEvent>) -> usize {
        rx.try_iter().filter(|e| e.name() == "input").count()
    }

    #[test]
    fn pointer_moves_are_local_to_the_element() {
        let (mut input, element, events) = setup(MouseConfig::default());
        assert_eq!(input.state(), InputState::Ready);

        element.dispatch(mouse(PointerKind::MouseMove, 200.0, 100.0, 0));
        input.update(Instant::now()).unwrap();

        assert_eq!(input.target_position(), Vec2::new(100.0, 50.0));
        assert_eq!(input.position(), Vec2::new(0.0, 0.0));
        assert_eq!(input.mode(), PointerMode::Mouse);
        assert_eq!(inputs(&events), 1);
    }

    #[test]
    fn press_toggle_counts_as_input() {
        let (mut input, element, events) = setup(MouseConfig::default());
        element.dispatch(mouse(PointerKind::MouseMove, 200.0, 100.0, 0));
        input.update(Instant::now()).unwrap();
        let _ = inputs(&events);

        element.dispatch(mouse(PointerKind::MouseDown, 200.0, 100.0, 1));
        input.update(Instant::now()).unwrap();
        assert!(input.pressed());
        assert_eq!(inputs(&events), 1);

        input.update(Instant::now()).unwrap();
        assert_eq!(inputs(&events), 0);

        element.dispatch(mouse(PointerKind::MouseUp, 200.0, 100.0, 0));
        input.update(Instant::now()).unwrap();
        assert_eq!(inputs(&events), 1);
    }

    #[test]
    fn touch_end_releases_and_empty_touches_are_ignored() {
        let (mut input, element, _events) = setup(MouseConfig::default());
        element.dispatch(mouse(PointerKind::TouchStart, 150.0, 75.0, 0));
        input.update(Instant::now()).unwrap();
        assert!(input.pressed());
        assert_eq!(input.mode(), PointerMode::Touch);
        assert_eq!(input.target_position(), Vec2::new(50.0, 25.0));

        element.dispatch(ElementEvent::Pointer(PointerEvent {
            kind: PointerKind::TouchEnd,
            client: Vec2::NAN,
            buttons: 0,
        }));
        input.update(Instant::now()).unwrap();
        assert!(!input.pressed());
        assert_eq!(input.target_position(), Vec2::new(50.0, 25.0));
    }

    #[test]
    fn arrow_keys_step_when_enabled() {
        let config = MouseConfig {
            amplification: 10.0,
            enable_keyboard: true,
            ..MouseConfig::default()
        };
        let (mut input, element, _events) = setup(config);

        element.dispatch(ElementEvent::KeyDown(Key::ArrowRight));
        element.dispatch(ElementEvent::KeyDown(Key::ArrowDown));
        input.update(Instant::now()).unwrap();

        assert_eq!(input.mode(), PointerMode::Keyboard);
        assert_eq!(input.target_position(), Vec2::new(10.0, 10.0));
        assert_eq!(input.position(), Vec2::new(-0.8, -0.8));

        for _ in 0..3 {
            element.dispatch(ElementEvent::KeyDown(Key::ArrowLeft));
        }
        input.update(Instant::now()).unwrap();
        assert_eq!(input.target_position().x, 0.0);
    }

    #[test]
    fn any_key_releases_the_press() {
        let config = MouseConfig {
            enable_keyboard: true,
            ..MouseConfig::default()
        };
        let (mut input, element, _events) = setup(config);
        element.dispatch(mouse(PointerKind::MouseDown, 150.0, 60.0, 1));
        input.update(Instant::now()).unwrap();
        assert!(input.pressed());

        element.dispatch(ElementEvent::KeyDown(Key::Other));
        input.update(Instant::now()).unwrap();
        assert!(!input.pressed());
        assert_eq!(input.mode(), PointerMode::Mouse);
    }

    #[test]
    fn arrow_keys_are_ignored_by_default() {
        let (mut input, element, events) = setup(MouseConfig::default());
        element.dispatch(ElementEvent::KeyDown(Key::ArrowRight));
        input.update(Instant::now()).unwrap();
        assert_eq!(input.mode(), PointerMode::Mouse);
        assert_eq!(input.target_position(), Vec2::ZERO);
        assert_eq!(inputs(&events), 0);
    }

    #[test]
    fn rebinding_moves_the_subscription() {
        let (mut input, old, _events) = setup(MouseConfig::default());
        let new = ContentElement::new("#other", Bounds::new(0.0, 0.0, 100.0, 100.0));

        input.set_content_element(Some(&new));
        assert_eq!(new.listener_count(), 1);

        old.dispatch(mouse(PointerKind::MouseMove, 150.0, 60.0, 0));
        assert_eq!(old.listener_count(), 0);

        new.dispatch(mouse(PointerKind::MouseMove, 25.0, 75.0, 0));
        input.update(Instant::now()).unwrap();
        assert_eq!(input.target_position(), Vec2::new(25.0, 75.0));
    }

    #[test]
    fn stop_unsubscribes() {
        let (mut input, element, events) = setup(MouseConfig::default());
        input.stop();
        element.dispatch(mouse(PointerKind::MouseMove, 150.0, 60.0, 0));
        assert_eq!(element.listener_count(), 0);
        assert_eq!(input.state(), InputState::Stopped);
        assert!(events.try_iter().any(|e| e.name() == "stop"));
    }
}
