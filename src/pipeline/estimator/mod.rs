mod movenet;

use std::thread;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, unbounded};

use crate::{
    config::ModelConfig,
    types::{Frame, Pose},
};

pub use movenet::{OrtModelLoader, decode_multipose, input_dims};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimateParams {
    pub image_scale_factor: f32,
    pub flip_horizontal: bool,
    pub output_stride: u32,
    pub max_detections: usize,
}

pub trait PoseEstimator: Send + 'static {
    /// Detect poses in `frame`, best first, in frame pixel coordinates.
    fn estimate(&mut self, frame: &Frame, params: &EstimateParams) -> Result<Vec<Pose>>;
}

pub trait ModelLoader: Send {
    fn load(&self, model: &ModelConfig) -> Result<Box<dyn PoseEstimator>>;
}

pub struct EstimationJob {
    pub generation: u64,
    pub frame: Frame,
    pub params: EstimateParams,
}

pub struct EstimationResult {
    pub generation: u64,
    pub poses: Result<Vec<Pose>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitError {
    Busy,
    Disconnected,
}

#[derive(Debug, PartialEq, Eq)]
pub struct WorkerGone;

/// Runs a pose estimator on its own thread, one job at a time.
pub struct EstimationWorker {
    job_tx: Option<Sender<EstimationJob>>,
    result_rx: Receiver<EstimationResult>,
    handle: Option<thread::JoinHandle<()>>,
}

impl EstimationWorker {
    pub fn spawn(estimator: Box<dyn PoseEstimator>) -> Self {
        let (job_tx, job_rx) = bounded(1);
        // Unbounded so the worker never blocks on a consumer that stopped polling.
        let (result_tx, result_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("pose-estimator".into())
            .spawn(move || run_worker_loop(estimator, job_rx, result_tx));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("failed to spawn pose estimation thread: {err:?}");
                None
            }
        };

        Self {
            job_tx: Some(job_tx),
            result_rx,
            handle,
        }
    }

    pub fn submit(&self, job: EstimationJob) -> Result<(), SubmitError> {
        let Some(job_tx) = self.job_tx.as_ref() else {
            return Err(SubmitError::Disconnected);
        };
        job_tx.try_send(job).map_err(|err| match err {
            TrySendError::Full(_) => SubmitError::Busy,
            TrySendError::Disconnected(_) => SubmitError::Disconnected,
        })
    }

    pub fn try_result(&self) -> Result<Option<EstimationResult>, WorkerGone> {
        match self.result_rx.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerGone),
        }
    }
}

impl Drop for EstimationWorker {
    fn drop(&mut self) {
        self.job_tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_worker_loop(
    mut estimator: Box<dyn PoseEstimator>,
    job_rx: Receiver<EstimationJob>,
    result_tx: Sender<EstimationResult>,
) {
    while let Ok(job) = job_rx.recv() {
        let poses = estimator.estimate(&job.frame, &job.params);
        let result = EstimationResult {
            generation: job.generation,
            poses,
        };
        if result_tx.send(result).is_err() {
            break;
        }
    }
    log::debug!("pose estimation worker exiting");
}
