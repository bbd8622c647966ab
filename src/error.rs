use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera access was denied")]
    PermissionDenied,
    #[error("no camera device is available")]
    NoDevice,
    #[error("camera stream disconnected")]
    Disconnected,
    #[error("timed out waiting for the first camera frame")]
    Timeout,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Could not open your camera. You may have denied access.")]
    PermissionDenied,
    #[error("No camera was found on this device.")]
    NoDevice,
    #[error("Body tracking is not supported on this platform ({0}).")]
    UnsupportedPlatform(String),
    #[error("failed to load pose model")]
    ModelLoad(#[source] anyhow::Error),
    #[error("camera failure")]
    Camera(#[source] anyhow::Error),
    #[error("cannot project into a {width}x{height} coordinate space")]
    Coordinate { width: f32, height: f32 },
    #[error("{name} must be within range, got {value}")]
    OutOfRange { name: &'static str, value: f32 },
    #[error("input was stopped while initializing")]
    Aborted,
    #[error("input is already initializing")]
    AlreadyInitializing,
    #[error("no content element is bound")]
    NoContentElement,
    #[error("pose estimation failed: {0}")]
    Estimation(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<CaptureError> for InputError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => InputError::PermissionDenied,
            CaptureError::NoDevice => InputError::NoDevice,
            CaptureError::Disconnected => {
                InputError::Camera(anyhow::anyhow!("camera stream disconnected"))
            }
            CaptureError::Timeout => InputError::Camera(anyhow::anyhow!(
                "timed out waiting for the first camera frame"
            )),
            CaptureError::Backend(err) => InputError::Camera(err),
        }
    }
}

impl InputError {
    pub fn name(&self) -> &'static str {
        match self {
            InputError::PermissionDenied => "PermissionDeniedError",
            InputError::NoDevice => "NoDeviceError",
            InputError::UnsupportedPlatform(_) => "UnsupportedPlatformError",
            InputError::ModelLoad(_) => "ModelLoadError",
            InputError::Camera(_) => "CameraError",
            InputError::Coordinate { .. } => "CoordinateError",
            InputError::OutOfRange { .. } => "RangeError",
            InputError::Aborted => "AbortError",
            InputError::AlreadyInitializing => "InvalidStateError",
            InputError::NoContentElement => "NoContentElementError",
            InputError::Estimation(_) => "EstimationError",
            InputError::InvalidConfig(_) => "ConfigError",
        }
    }
}

/// Serializable view of an error, as carried by `error` events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetail {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl From<&InputError> for ErrorDetail {
    fn from(err: &InputError) -> Self {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        ErrorDetail {
            name: err.name().to_string(),
            message: err.to_string(),
            stack: if chain.is_empty() {
                None
            } else {
                Some(chain.join("\n"))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn capture_errors_keep_their_kind() {
        assert!(matches!(
            InputError::from(CaptureError::PermissionDenied),
            InputError::PermissionDenied
        ));
        assert!(matches!(
            InputError::from(CaptureError::NoDevice),
            InputError::NoDevice
        ));
        assert!(matches!(
            InputError::from(CaptureError::Timeout),
            InputError::Camera(_)
        ));
    }

    #[test]
    fn detail_includes_source_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("file not found"));
        let err = InputError::ModelLoad(inner.context("reading movenet.onnx").unwrap_err());
        let detail = ErrorDetail::from(&err);
        assert_eq!(detail.name, "ModelLoadError");
        assert_eq!(detail.message, "failed to load pose model");
        let stack = detail.stack.unwrap();
        assert!(stack.contains("reading movenet.onnx"));
        assert!(stack.contains("file not found"));
    }

    #[test]
    fn plain_errors_have_no_stack() {
        let detail = ErrorDetail::from(&InputError::Aborted);
        assert_eq!(detail.name, "AbortError");
        assert!(detail.stack.is_none());
    }
}
