use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::{
    config::{CaptureOptions, ModelConfig},
    error::CaptureError,
    input::StopHandle,
    pipeline::{
        capture::{CameraBackend, StreamInfo},
        estimator::{EstimateParams, ModelLoader, PoseEstimator},
    },
    types::{BodyPart, Frame, KEYPOINT_PARTS, Keypoint, Pose},
    vec2::Vec2,
};

pub fn solid_frame(width: u32, height: u32, color: [u8; 4]) -> Frame {
    let mut frame = Frame::blank(width, height);
    for px in frame.rgba.chunks_exact_mut(4) {
        px.copy_from_slice(&color);
    }
    frame
}

/// A confident pose with every keypoint at `position`.
pub fn pose_at(part: BodyPart, position: Vec2) -> Pose {
    let keypoints = KEYPOINT_PARTS
        .iter()
        .map(|&p| Keypoint {
            part: p,
            position: if p == part { position } else { Vec2::ZERO },
            score: 1.0,
        })
        .collect();
    Pose {
        score: 0.9,
        keypoints,
    }
}

/// Shared view into a `FakeCamera` after it has been boxed.
#[derive(Clone, Default)]
pub struct CameraProbe {
    frames: Arc<Mutex<VecDeque<Frame>>>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    denials: Arc<AtomicUsize>,
    disconnected: Arc<AtomicBool>,
}

impl CameraProbe {
    pub fn push_frame(&self, frame: Frame) {
        self.frames.lock().unwrap().push_back(frame);
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Refuse the next open with a permission error.
    pub fn deny_next_open(&self) {
        self.denials.fetch_add(1, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

pub struct FakeCamera {
    probe: CameraProbe,
    width: u32,
    height: u32,
    frame_rate: Option<u32>,
    open_error: Option<fn() -> CaptureError>,
    open: bool,
}

impl FakeCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            probe: CameraProbe::default(),
            width,
            height,
            frame_rate: Some(30),
            open_error: None,
            open: false,
        }
    }

    pub fn denied() -> Self {
        Self {
            open_error: Some(|| CaptureError::PermissionDenied),
            ..Self::new(640, 480)
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: Option<u32>) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
        }
    }
}

impl CameraBackend for FakeCamera {
    fn open(&mut self, _options: &CaptureOptions) -> Result<StreamInfo, CaptureError> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.open_error {
            return Err(err());
        }
        let denied = self
            .probe
            .denials
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if denied {
            return Err(CaptureError::PermissionDenied);
        }
        self.open = true;
        Ok(self.info())
    }

    fn next_frame(&mut self, _timeout: Option<Duration>) -> Result<Frame, CaptureError> {
        if self.probe.disconnected.load(Ordering::SeqCst) {
            return Err(CaptureError::Disconnected);
        }
        self.probe
            .frames
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(CaptureError::Timeout)
    }

    fn try_latest_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.probe.disconnected.load(Ordering::SeqCst) {
            return Err(CaptureError::Disconnected);
        }
        Ok(self.probe.frames.lock().unwrap().drain(..).last())
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        self.open.then(|| self.info())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Replays canned estimations, optionally waiting on a gate before each one.
pub struct GatedEstimator {
    responses: VecDeque<Vec<Pose>>,
    last: Vec<Pose>,
    gate: Option<Receiver<()>>,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl GatedEstimator {
    fn build(responses: Vec<Vec<Pose>>, gate: Option<Receiver<()>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let estimator = Self {
            responses: responses.into(),
            last: Vec::new(),
            gate,
            calls: calls.clone(),
            fail: false,
        };
        (estimator, calls)
    }

    pub fn ungated(responses: Vec<Vec<Pose>>) -> (Self, Arc<AtomicUsize>) {
        Self::build(responses, None)
    }

    pub fn gated(responses: Vec<Vec<Pose>>) -> (Self, Sender<()>, Arc<AtomicUsize>) {
        let (gate_tx, gate_rx) = bounded(0);
        let (estimator, calls) = Self::build(responses, Some(gate_rx));
        (estimator, gate_tx, calls)
    }

    pub fn failing() -> (Self, Arc<AtomicUsize>) {
        let (mut estimator, calls) = Self::build(Vec::new(), None);
        estimator.fail = true;
        (estimator, calls)
    }
}

impl PoseEstimator for GatedEstimator {
    fn estimate(&mut self, _frame: &Frame, _params: &EstimateParams) -> Result<Vec<Pose>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gate.as_ref() {
            let _ = gate.recv();
        }
        if self.fail {
            return Err(anyhow!("inference exploded"));
        }
        if let Some(next) = self.responses.pop_front() {
            self.last = next;
        }
        Ok(self.last.clone())
    }
}

/// Hands out one estimator, counting loads.
pub struct ScriptedLoader {
    estimator: Mutex<Option<Box<dyn PoseEstimator>>>,
    loads: Arc<AtomicUsize>,
    fail: bool,
    stop_on_load: Arc<Mutex<Option<StopHandle>>>,
}

impl ScriptedLoader {
    pub fn new(estimator: impl PoseEstimator) -> Self {
        Self {
            estimator: Mutex::new(Some(Box::new(estimator))),
            loads: Arc::new(AtomicUsize::new(0)),
            fail: false,
            stop_on_load: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing() -> Self {
        let (estimator, _) = GatedEstimator::ungated(Vec::new());
        Self {
            fail: true,
            ..Self::new(estimator)
        }
    }

    pub fn loads(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }

    /// Slot for a handle that is asked to stop while the model loads.
    pub fn stop_on_load(&self) -> Arc<Mutex<Option<StopHandle>>> {
        self.stop_on_load.clone()
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self, _model: &ModelConfig) -> Result<Box<dyn PoseEstimator>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.stop_on_load.lock().unwrap().as_ref() {
            handle.request_stop();
        }
        if self.fail {
            return Err(anyhow!("model file is corrupt"));
        }
        self.estimator
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("estimator was already handed out"))
    }
}
