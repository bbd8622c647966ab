pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod input;
pub mod model_download;
pub mod pipeline;
pub mod transform;
pub mod types;
pub mod vec2;

#[cfg(test)]
mod test_support;

pub use config::{Config, InputMode};
pub use content::{Bounds, ContentElement, ContentRegistry};
pub use error::{CaptureError, InputError};
pub use events::{InputDetail, InputEvent};
pub use input::{InputKind, InputSource, InputState, MouseInput, PoseInput, StopHandle};
pub use types::{BodyPart, Frame, InputType, Pose};
pub use vec2::Vec2;
