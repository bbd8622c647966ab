#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod capture;
pub mod estimator;
pub mod rgba_converter;
pub mod skeleton;

#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, NokhwaCamera, available_cameras};
pub use capture::{CameraBackend, CaptureSource, CaptureState, StreamInfo};
pub use estimator::{
    EstimateParams, EstimationWorker, ModelLoader, OrtModelLoader, PoseEstimator,
};
pub use skeleton::RgbaCanvas;
