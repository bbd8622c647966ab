use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::rgba_converter::mirror_into;
use crate::{
    config::{CaptureOptions, DEFAULT_FRAME_RATE},
    error::CaptureError,
    types::Frame,
    vec2::Vec2,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<u32>,
}

/// A source of RGBA camera frames.
pub trait CameraBackend: Send {
    fn open(&mut self, options: &CaptureOptions) -> Result<StreamInfo, CaptureError>;
    /// Block until a frame arrives. `None` waits forever.
    fn next_frame(&mut self, timeout: Option<Duration>) -> Result<Frame, CaptureError>;
    /// The newest frame delivered since the last call, if any.
    fn try_latest_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
    fn stream_info(&self) -> Option<StreamInfo>;
    fn close(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Uninitialized,
    Acquiring,
    Streaming,
    Stopped,
}

/// Owns the camera stream and a mirrored frame buffer sized to it.
pub struct CaptureSource {
    backend: Box<dyn CameraBackend>,
    options: CaptureOptions,
    state: CaptureState,
    buffer: Frame,
    info: Option<StreamInfo>,
}

impl CaptureSource {
    pub fn new(backend: Box<dyn CameraBackend>, options: CaptureOptions) -> Self {
        Self {
            backend,
            options,
            state: CaptureState::Uninitialized,
            buffer: Frame::blank(0, 0),
            info: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Open the camera and wait for its first non-empty frame. A second call
    /// while streaming does nothing.
    pub fn initialize(&mut self) -> Result<(), CaptureError> {
        if self.state == CaptureState::Streaming {
            return Ok(());
        }

        self.state = CaptureState::Acquiring;
        match self.acquire() {
            Ok(()) => {
                self.state = CaptureState::Streaming;
                Ok(())
            }
            Err(err) => {
                self.backend.close();
                self.info = None;
                self.state = CaptureState::Uninitialized;
                Err(err)
            }
        }
    }

    fn acquire(&mut self) -> Result<(), CaptureError> {
        let info = self.backend.open(&self.options)?;
        info!(
            "camera stream opened at {}x{} ({:?} fps)",
            info.width, info.height, info.frame_rate
        );
        self.info = Some(info);

        let deadline = self
            .options
            .first_frame_timeout()
            .map(|timeout| Instant::now() + timeout);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                return Err(CaptureError::Timeout);
            }
            let frame = self.backend.next_frame(remaining)?;
            if frame.is_empty() {
                debug!("camera produced an empty frame, waiting for dimensions");
                continue;
            }
            if !self.store(&frame) {
                continue;
            }
            return Ok(());
        }
    }

    /// Copy the newest camera frame into the buffer. Returns whether a new
    /// frame was available.
    pub fn update(&mut self) -> Result<bool, CaptureError> {
        if self.state != CaptureState::Streaming {
            return Ok(false);
        }
        match self.backend.try_latest_frame()? {
            Some(frame) if !frame.is_empty() => Ok(self.store(&frame)),
            _ => Ok(false),
        }
    }

    fn store(&mut self, frame: &Frame) -> bool {
        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.rgba.len() != expected {
            warn!(
                "dropping malformed {}x{} frame with {} bytes",
                frame.width,
                frame.height,
                frame.rgba.len()
            );
            return false;
        }
        if (frame.width, frame.height) != (self.buffer.width, self.buffer.height) {
            self.resize_to(frame.width, frame.height);
        }
        mirror_into(&frame.rgba, &mut self.buffer.rgba, frame.width);
        self.buffer.timestamp = frame.timestamp;
        true
    }

    /// Match the buffer to the current stream dimensions.
    pub fn resize(&mut self) {
        if let Some(info) = self.backend.stream_info() {
            self.info = Some(info);
            if (info.width, info.height) != (self.buffer.width, self.buffer.height) {
                self.resize_to(info.width, info.height);
            }
        }
    }

    fn resize_to(&mut self, width: u32, height: u32) {
        debug!("capture buffer resized to {width}x{height}");
        self.buffer = Frame::blank(width, height);
    }

    pub fn stop(&mut self) {
        if matches!(
            self.state,
            CaptureState::Streaming | CaptureState::Acquiring
        ) {
            self.backend.close();
            info!("camera stream closed");
        }
        self.state = CaptureState::Stopped;
    }

    pub fn frame_rate(&self) -> u32 {
        self.info
            .and_then(|info| info.frame_rate)
            .filter(|&fps| fps > 0)
            .unwrap_or(DEFAULT_FRAME_RATE)
    }

    pub fn frame(&self) -> &Frame {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    pub fn height(&self) -> u32 {
        self.buffer.height
    }

    pub fn dimensions(&self) -> Vec2 {
        Vec2::new(self.buffer.width as f32, self.buffer.height as f32)
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCamera, solid_frame};

    fn source(camera: FakeCamera) -> CaptureSource {
        CaptureSource::new(Box::new(camera), CaptureOptions::default())
    }

    #[test]
    fn waits_past_empty_frames() {
        let camera = FakeCamera::new(4, 2);
        let probe = camera.probe();
        probe.push_frame(Frame::blank(0, 0));
        probe.push_frame(solid_frame(4, 2, [10, 20, 30, 255]));

        let mut capture = source(camera);
        capture.initialize().unwrap();
        assert_eq!(capture.state(), CaptureState::Streaming);
        assert_eq!((capture.width(), capture.height()), (4, 2));
        assert_eq!(&capture.frame().rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn waits_past_malformed_frames() {
        let camera = FakeCamera::new(4, 2);
        let probe = camera.probe();
        let mut short = Frame::blank(4, 2);
        short.rgba.truncate(3);
        probe.push_frame(short);
        probe.push_frame(solid_frame(4, 2, [10, 20, 30, 255]));

        let mut capture = source(camera);
        capture.initialize().unwrap();
        assert_eq!(capture.state(), CaptureState::Streaming);
        assert_eq!((capture.width(), capture.height()), (4, 2));
    }

    #[test]
    fn initialize_is_idempotent() {
        let camera = FakeCamera::new(2, 2);
        let probe = camera.probe();
        probe.push_frame(solid_frame(2, 2, [0, 0, 0, 255]));

        let mut capture = source(camera);
        capture.initialize().unwrap();
        capture.initialize().unwrap();
        assert_eq!(probe.opens(), 1);
    }

    #[test]
    fn open_failure_resets_state() {
        let mut capture = source(FakeCamera::denied());
        assert!(matches!(
            capture.initialize(),
            Err(CaptureError::PermissionDenied)
        ));
        assert_eq!(capture.state(), CaptureState::Uninitialized);
    }

    #[test]
    fn update_mirrors_and_follows_size_changes() {
        let camera = FakeCamera::new(2, 1);
        let probe = camera.probe();
        probe.push_frame(solid_frame(2, 1, [0, 0, 0, 255]));
        let mut capture = source(camera);
        capture.initialize().unwrap();

        assert!(!capture.update().unwrap());

        let mut frame = Frame::blank(3, 1);
        frame.rgba = vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3];
        probe.push_frame(frame);
        assert!(capture.update().unwrap());
        assert_eq!((capture.width(), capture.height()), (3, 1));
        assert_eq!(capture.frame().rgba, [3, 3, 3, 3, 2, 2, 2, 2, 1, 1, 1, 1]);
    }

    #[test]
    fn frame_rate_defaults_when_unknown() {
        let camera = FakeCamera::new(2, 2).with_frame_rate(None);
        let probe = camera.probe();
        probe.push_frame(solid_frame(2, 2, [0, 0, 0, 255]));
        let mut capture = source(camera);
        assert_eq!(capture.frame_rate(), DEFAULT_FRAME_RATE);
        capture.initialize().unwrap();
        assert_eq!(capture.frame_rate(), DEFAULT_FRAME_RATE);
    }

    #[test]
    fn stop_closes_the_stream() {
        let camera = FakeCamera::new(2, 2);
        let probe = camera.probe();
        probe.push_frame(solid_frame(2, 2, [0, 0, 0, 255]));
        let mut capture = source(camera);
        capture.initialize().unwrap();
        capture.stop();
        assert_eq!(capture.state(), CaptureState::Stopped);
        assert_eq!(probe.closes(), 1);
        assert!(!capture.update().unwrap());
    }
}
