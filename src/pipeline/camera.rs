use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use nokhwa::{
    Camera, NokhwaError,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution,
    },
};

use super::{
    capture::{CameraBackend, StreamInfo},
    rgba_converter::{self, PixelLayout},
};
use crate::{config::CaptureOptions, error::CaptureError, types::Frame};

// Built-in macOS cameras often reject YUYV even though it is reported.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::MJPEG,
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::NV12,
    FrameFormat::YUYV,
    FrameFormat::GRAY,
];

// Frames buffered between the capture thread and the consumer.
const FRAME_QUEUE: usize = 2;

fn requested_formats(options: &CaptureOptions) -> [RequestedFormat<'static>; 4] {
    let closest = CameraFormat::new(
        Resolution::new(options.width, options.height),
        FrameFormat::MJPEG,
        options.frame_rate,
    );
    [
        RequestedFormat::with_formats(
            RequestedFormatType::Closest(closest),
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    format!("{} ({})", info.human_name(), info.index())
}

fn classify_open_error(err: NokhwaError) -> CaptureError {
    let message = err.to_string().to_lowercase();
    if ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| message.contains(needle))
    {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Backend(anyhow!(err))
    }
}

fn build_camera(index: &CameraIndex, options: &CaptureOptions) -> Result<Camera, CaptureError> {
    let mut last_err = None;

    for requested in requested_formats(options) {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err),
            },
            Err(err) => last_err = Some(err),
        }
    }

    Err(match last_err {
        Some(err) => classify_open_error(err),
        None => CaptureError::Backend(anyhow!("failed to open camera with any supported format")),
    })
}

fn pixel_layout(format: FrameFormat) -> PixelLayout {
    match format {
        FrameFormat::MJPEG => PixelLayout::Mjpeg,
        FrameFormat::YUYV => PixelLayout::Yuyv,
        FrameFormat::NV12 => PixelLayout::Nv12,
        FrameFormat::GRAY => PixelLayout::Gray,
        FrameFormat::RAWRGB => PixelLayout::Rgb,
        FrameFormat::RAWBGR => PixelLayout::Bgr,
    }
}

#[derive(Debug)]
struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Camera backend that runs a nokhwa capture thread.
pub struct NokhwaCamera {
    stream: Option<CameraStream>,
    frames: Option<Receiver<Frame>>,
    info: Option<StreamInfo>,
}

impl NokhwaCamera {
    pub fn new() -> Self {
        Self {
            stream: None,
            frames: None,
            info: None,
        }
    }
}

impl Default for NokhwaCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraBackend for NokhwaCamera {
    fn open(&mut self, options: &CaptureOptions) -> Result<StreamInfo, CaptureError> {
        self.close();

        let cameras = query(ApiBackend::Auto).map_err(classify_open_error)?;
        if cameras.is_empty() {
            return Err(CaptureError::NoDevice);
        }
        let index = CameraIndex::Index(options.camera_index);

        let (setup_tx, setup_rx) = bounded(1);
        let (frame_tx, frame_rx) = bounded(FRAME_QUEUE);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let options = options.clone();

        let handle = thread::spawn(move || {
            let camera = match build_camera(&index, &options) {
                Ok(camera) => camera,
                Err(err) => {
                    let _ = setup_tx.send(Err(err));
                    return;
                }
            };
            let resolution = camera.resolution();
            let info = StreamInfo {
                width: resolution.width(),
                height: resolution.height(),
                frame_rate: Some(camera.frame_rate()),
            };
            if setup_tx.send(Ok(info)).is_err() {
                return;
            }
            run_capture_loop(camera, &stop_flag, &frame_tx);
        });

        let stream = CameraStream {
            stop,
            handle: Some(handle),
        };
        match setup_rx.recv() {
            Ok(Ok(info)) => {
                self.stream = Some(stream);
                self.frames = Some(frame_rx);
                self.info = Some(info);
                Ok(info)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(CaptureError::Backend(anyhow!(
                "camera thread exited during setup"
            ))),
        }
    }

    fn next_frame(&mut self, timeout: Option<Duration>) -> Result<Frame, CaptureError> {
        let frames = self.frames.as_ref().ok_or(CaptureError::Disconnected)?;
        match timeout {
            Some(timeout) => frames.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => CaptureError::Timeout,
                RecvTimeoutError::Disconnected => CaptureError::Disconnected,
            }),
            None => frames.recv().map_err(|_| CaptureError::Disconnected),
        }
    }

    fn try_latest_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let frames = self.frames.as_ref().ok_or(CaptureError::Disconnected)?;
        let mut latest = None;
        loop {
            match frames.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(TryRecvError::Empty) => return Ok(latest),
                Err(TryRecvError::Disconnected) => {
                    return latest.map(Some).ok_or(CaptureError::Disconnected);
                }
            }
        }
    }

    fn stream_info(&self) -> Option<StreamInfo> {
        self.info
    }

    fn close(&mut self) {
        self.frames = None;
        self.stream = None;
        self.info = None;
    }
}

fn run_capture_loop(mut camera: Camera, stop: &AtomicBool, frame_tx: &Sender<Frame>) {
    let mut consecutive_failures = 0u32;
    let mut rgba = Vec::new();

    while !stop.load(Ordering::Relaxed) {
        let frame_start = Instant::now();
        let buffer = match camera.frame() {
            Ok(buffer) => {
                consecutive_failures = 0;
                buffer
            }
            Err(err) => {
                consecutive_failures += 1;
                log::warn!(
                    "camera frame read failed (after {:?}): {err:?}",
                    frame_start.elapsed()
                );
                if consecutive_failures >= 30 {
                    log::error!("camera stopped delivering frames, closing stream");
                    break;
                }
                continue;
            }
        };

        let resolution = buffer.resolution();
        rgba.clear();
        let converted = rgba_converter::convert_into(
            pixel_layout(buffer.source_frame_format()),
            buffer.buffer(),
            resolution.width(),
            resolution.height(),
            &mut rgba,
        );
        let (width, height) = match converted {
            Ok(dims) => dims,
            Err(err) => {
                log::warn!("failed to decode camera frame {err:?}");
                continue;
            }
        };

        let frame = Frame {
            rgba: std::mem::take(&mut rgba),
            width,
            height,
            timestamp: Instant::now(),
        };
        match frame_tx.try_send(frame) {
            Ok(()) => {}
            // Drop if the consumer is behind, keeping the buffer for the next frame.
            Err(crossbeam_channel::TrySendError::Full(frame)) => rgba = frame.rgba,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => break,
        }
    }

    if let Err(err) = camera.stop_stream() {
        log::debug!("camera stop_stream failed: {err:?}");
    }
}
