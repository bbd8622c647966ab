use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{
    error::ErrorDetail,
    types::{BodyPart, InputType, Pose},
    vec2::Vec2,
};

#[derive(Clone, Debug, PartialEq)]
pub struct PoseDetail {
    pub body_part: BodyPart,
    pub pose: Option<Pose>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InputDetail {
    pub input_type: InputType,
    pub position: Vec2,
    pub pose: Option<PoseDetail>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    Initializing(InputDetail),
    Ready(InputDetail),
    Tick(InputDetail),
    Input(InputDetail),
    Change(InputDetail),
    Stop(InputDetail),
    ControlsOpen(InputDetail),
    ControlsClose(InputDetail),
    Error(ErrorDetail),
}

impl InputEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InputEvent::Initializing(_) => "initializing",
            InputEvent::Ready(_) => "ready",
            InputEvent::Tick(_) => "tick",
            InputEvent::Input(_) => "input",
            InputEvent::Change(_) => "change",
            InputEvent::Stop(_) => "stop",
            InputEvent::ControlsOpen(_) => "controlsopen",
            InputEvent::ControlsClose(_) => "controlsclose",
            InputEvent::Error(_) => "error",
        }
    }

    pub fn detail(&self) -> Option<&InputDetail> {
        match self {
            InputEvent::Initializing(d)
            | InputEvent::Ready(d)
            | InputEvent::Tick(d)
            | InputEvent::Input(d)
            | InputEvent::Change(d)
            | InputEvent::Stop(d)
            | InputEvent::ControlsOpen(d)
            | InputEvent::ControlsClose(d) => Some(d),
            InputEvent::Error(_) => None,
        }
    }
}

/// Fan-out of input events to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<InputEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<InputEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn emit(&mut self, event: InputEvent) {
        // Receivers that were dropped are pruned on the next send.
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail() -> InputDetail {
        InputDetail {
            input_type: InputType::Mouse,
            position: Vec2::new(0.5, -0.5),
            pose: None,
        }
    }

    #[test]
    fn every_subscriber_sees_events_in_order() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(InputEvent::Input(detail()));
        bus.emit(InputEvent::Tick(detail()));

        for rx in [a, b] {
            let names: Vec<_> = rx.try_iter().map(|e| e.name()).collect();
            assert_eq!(names, ["input", "tick"]);
        }
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.emit(InputEvent::Stop(detail()));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.try_recv().unwrap().name(), "stop");
    }

    #[test]
    fn error_events_have_no_input_detail() {
        let event = InputEvent::Error(ErrorDetail {
            name: "NoDeviceError".into(),
            message: "none".into(),
            stack: None,
        });
        assert!(event.detail().is_none());
        assert_eq!(event.name(), "error");
    }
}
