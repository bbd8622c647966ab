use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock, Weak},
};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::vec2::Vec2;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    MouseDown,
    MouseMove,
    MouseUp,
    TouchStart,
    TouchMove,
    TouchEnd,
}

impl PointerKind {
    pub fn is_touch(&self) -> bool {
        matches!(
            self,
            PointerKind::TouchStart | PointerKind::TouchMove | PointerKind::TouchEnd
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    /// Viewport coordinates. NaN for a touch event without touches.
    pub client: Vec2,
    /// Pressed button mask, mouse events only.
    pub buttons: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowUp,
    ArrowRight,
    ArrowDown,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ElementEvent {
    Pointer(PointerEvent),
    KeyDown(Key),
}

/// A host-owned surface whose bounds define the cursor coordinate space.
#[derive(Debug)]
pub struct ContentElement {
    selector: String,
    bounds: RwLock<Bounds>,
    listeners: Mutex<Vec<Sender<ElementEvent>>>,
}

impl ContentElement {
    pub fn new(selector: impl Into<String>, bounds: Bounds) -> Arc<Self> {
        Arc::new(Self {
            selector: selector.into(),
            bounds: RwLock::new(bounds),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn bounds(&self) -> Bounds {
        *self.bounds.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_bounds(&self, bounds: Bounds) {
        *self.bounds.write().unwrap_or_else(PoisonError::into_inner) = bounds;
    }

    pub fn dimensions(&self) -> Vec2 {
        let b = self.bounds();
        Vec2::new(b.width, b.height)
    }

    /// Convert viewport coordinates to element-local coordinates.
    pub fn to_local(&self, client: Vec2) -> Vec2 {
        let b = self.bounds();
        Vec2::new(client.x - b.left, client.y - b.top)
    }

    pub fn subscribe(&self) -> Receiver<ElementEvent> {
        let (tx, rx) = unbounded();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver an event to every listener, dropping listeners that went away.
    pub fn dispatch(&self, event: ElementEvent) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event).is_ok());
    }
}

/// Lookup table from selector to element; the only strong owner of elements.
#[derive(Debug, Default)]
pub struct ContentRegistry {
    elements: RwLock<HashMap<String, Arc<ContentElement>>>,
}

impl ContentRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, element: Arc<ContentElement>) {
        self.elements
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(element.selector().to_string(), element);
    }

    pub fn remove(&self, selector: &str) -> Option<Arc<ContentElement>> {
        self.elements
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(selector)
    }

    pub fn query(&self, selector: &str) -> Option<Arc<ContentElement>> {
        self.elements
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(selector)
            .cloned()
    }
}

/// Weak, lazily resolved binding from an input to its content element.
#[derive(Debug, Default)]
pub struct ContentBinding {
    selector: String,
    registry: Option<Arc<ContentRegistry>>,
    element: Weak<ContentElement>,
}

impl ContentBinding {
    pub fn new(registry: Option<Arc<ContentRegistry>>, selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            registry,
            element: Weak::new(),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Change the selector. The current element is released and re-queried.
    /// Returns true when the resolved element changed.
    pub fn set_selector(&mut self, selector: impl Into<String>) -> bool {
        let before = self.element.upgrade();
        self.selector = selector.into();
        self.element = Weak::new();
        let after = self.resolve();
        !same_element(before.as_ref(), after.as_ref())
    }

    /// Bind directly to an element. Returns true when it changed.
    pub fn set_element(&mut self, element: Option<&Arc<ContentElement>>) -> bool {
        let before = self.element.upgrade();
        self.element = element.map(Arc::downgrade).unwrap_or_default();
        !same_element(before.as_ref(), element)
    }

    pub fn resolve(&mut self) -> Option<Arc<ContentElement>> {
        if let Some(element) = self.element.upgrade() {
            return Some(element);
        }
        if self.selector.is_empty() {
            return None;
        }
        let element = self.registry.as_ref()?.query(&self.selector)?;
        self.element = Arc::downgrade(&element);
        Some(element)
    }

    /// The bound element without attempting a lookup.
    pub fn current(&self) -> Option<Arc<ContentElement>> {
        self.element.upgrade()
    }
}

fn same_element(a: Option<&Arc<ContentElement>>, b: Option<&Arc<ContentElement>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
