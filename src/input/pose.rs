use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use regex::Regex;

use super::{FrameStep, InputSource, StopHandle, frame_loop::FrameLoop, lifecycle::InputCore};
use crate::{
    config::{PoseConfig, check_positive, check_range, check_unit},
    content::ContentRegistry,
    error::{CaptureError, InputError},
    events::PoseDetail,
    pipeline::{
        capture::{CameraBackend, CaptureSource},
        estimator::{
            EstimateParams, EstimationJob, EstimationWorker, ModelLoader, SubmitError,
        },
        skeleton::{CENTER_COLOR, CURSOR_COLOR, POSE_SEGMENTS, RgbaCanvas, SKELETON_COLOR},
    },
    transform::{clamp, scalemap, transform_camera_points},
    types::{BodyPart, InputType, KEYPOINT_PARTS, Pose},
    vec2::{self, Vec2},
};

const CURSOR_RADIUS: i32 = 16;
const CENTER_RADIUS: f32 = 16.0;
const JOINT_RADIUS: i32 = 4;

fn tracked_parts() -> impl Iterator<Item = BodyPart> {
    KEYPOINT_PARTS
        .into_iter()
        .chain(std::iter::once(BodyPart::Sternum))
}

/// Push `position` away from `center` by `amplification`.
pub fn amplify(position: Vec2, center: Vec2, amplification: f32) -> Vec2 {
    if amplification == 1.0 {
        return position;
    }
    center + (position - center) * amplification
}

/// Body tracking input: camera frames go through a pose model and the
/// tracked keypoint drives the cursor.
pub struct PoseInput {
    core: InputCore,
    config: PoseConfig,
    capture: CaptureSource,
    loader: Box<dyn ModelLoader>,
    worker: Option<EstimationWorker>,
    frame_loop: FrameLoop,
    platform_filter: Regex,
    stop_handle: StopHandle,
    estimating: bool,
    generation: u64,
    pose: Option<Pose>,
    eased_keypoints: HashMap<BodyPart, Vec2>,
    source_center: Option<Vec2>,
    preamplified_target_position: Vec2,
    last_source_position: Vec2,
    help: bool,
}

impl PoseInput {
    pub fn new(
        config: PoseConfig,
        camera: Box<dyn CameraBackend>,
        loader: Box<dyn ModelLoader>,
        registry: Option<Arc<ContentRegistry>>,
    ) -> Result<Self, InputError> {
        config.validate()?;
        let platform_filter = Regex::new(&config.unsupported_platform_pattern).map_err(|err| {
            InputError::InvalidConfig(format!("unsupported_platform_pattern: {err}"))
        })?;
        let core = InputCore::new(InputType::Pose, &config.input, registry)?;
        let capture = CaptureSource::new(camera, config.capture.clone());
        let frame_loop = FrameLoop::with_fps(config.capture.frame_rate as f32);

        Ok(Self {
            core,
            config,
            capture,
            loader,
            worker: None,
            frame_loop,
            platform_filter,
            stop_handle: StopHandle::new(),
            estimating: false,
            generation: 0,
            pose: None,
            eased_keypoints: HashMap::new(),
            source_center: None,
            preamplified_target_position: Vec2::NAN,
            last_source_position: Vec2::NAN,
            help: false,
        })
    }

    /// Pose input on the system camera with the ONNX MoveNet model.
    #[cfg(feature = "camera-nokhwa")]
    pub fn with_system_camera(
        config: PoseConfig,
        registry: Option<Arc<ContentRegistry>>,
    ) -> Result<Self, InputError> {
        Self::new(
            config,
            Box::new(crate::pipeline::camera::NokhwaCamera::new()),
            Box::new(crate::pipeline::estimator::OrtModelLoader),
            registry,
        )
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    pub fn capture(&self) -> &CaptureSource {
        &self.capture
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop_handle.clone()
    }

    pub fn clear_aborted(&mut self) {
        self.core.clear_aborted();
    }

    pub fn is_estimating(&self) -> bool {
        self.estimating
    }

    pub fn pose(&self) -> Option<&Pose> {
        self.pose.as_ref()
    }

    pub fn source_center(&self) -> Option<Vec2> {
        self.source_center
    }

    pub fn preamplified_target_position(&self) -> Vec2 {
        self.preamplified_target_position
    }

    pub fn last_source_position(&self) -> Vec2 {
        self.last_source_position
    }

    fn fail(&mut self, err: InputError) -> InputError {
        self.core.fail(&err);
        err
    }

    /// Tear down after an unrecoverable runtime error.
    fn fail_fatal(&mut self, err: InputError, drop_worker: bool) -> InputError {
        self.stop();
        if drop_worker {
            self.worker = None;
        }
        self.fail(err)
    }

    fn abort_initialization(&mut self) -> InputError {
        info!("pose input stopped while initializing");
        self.capture.stop();
        self.core.dispatch_stop();
        InputError::Aborted
    }

    fn start(&mut self) -> Result<(), InputError> {
        if !self.core.can_initialize() {
            return Err(if self.core.aborted() {
                InputError::Aborted
            } else {
                InputError::AlreadyInitializing
            });
        }
        if self.core.is_ready() {
            return Ok(());
        }

        self.stop_handle.reset();
        self.core.dispatch_initializing();

        let platform = self.config.platform_string();
        if self.platform_filter.is_match(&platform) {
            return Err(self.fail(InputError::UnsupportedPlatform(platform)));
        }

        if self.worker.is_none() {
            info!("loading pose model {}", self.config.model.path.display());
            match self.loader.load(&self.config.model) {
                Ok(estimator) => self.worker = Some(EstimationWorker::spawn(estimator)),
                Err(err) => return Err(self.fail(InputError::ModelLoad(err))),
            }
        }
        if self.stop_handle.is_requested() {
            return Err(self.abort_initialization());
        }

        if let Err(err) = self.capture.initialize() {
            return Err(self.fail(err.into()));
        }
        if self.stop_handle.is_requested() {
            return Err(self.abort_initialization());
        }

        if self.source_center.is_none() {
            self.reset_center();
        }

        self.frame_loop.set_fps(self.capture.frame_rate() as f32);
        self.frame_loop.start();
        self.core.dispatch_ready();
        info!(
            "pose input ready at {}x{}, {} fps",
            self.capture.width(),
            self.capture.height(),
            self.capture.frame_rate()
        );
        Ok(())
    }

    fn poll(&mut self, now: Instant) -> Result<(), InputError> {
        if !self.core.is_ready() {
            return Ok(());
        }
        if self.stop_handle.take_request() {
            self.stop();
            return Ok(());
        }

        self.poll_estimation()?;
        if self.core.is_ready() && self.frame_loop.poll(now) {
            self.handle_new_frame()?;
        }
        Ok(())
    }

    fn poll_estimation(&mut self) -> Result<(), InputError> {
        loop {
            let next = match self.worker.as_ref() {
                Some(worker) => worker.try_result(),
                None => return Ok(()),
            };
            let result = match next {
                Ok(Some(result)) => result,
                Ok(None) => return Ok(()),
                Err(_) => {
                    let err = InputError::Estimation("pose estimation worker stopped".into());
                    return Err(self.fail_fatal(err, true));
                }
            };

            if result.generation != self.generation {
                debug!(
                    "discarding pose result from generation {} (now {})",
                    result.generation, self.generation
                );
                continue;
            }
            self.estimating = false;
            match result.poses {
                Ok(poses) => self.apply_poses(poses),
                Err(err) => warn!("pose estimation failed: {err:#}"),
            }
        }
    }

    fn estimate_params(&self) -> EstimateParams {
        EstimateParams {
            image_scale_factor: self.config.image_scale_factor,
            // The capture buffer is already mirrored.
            flip_horizontal: false,
            output_stride: self.config.output_stride,
            max_detections: 1,
        }
    }

    /// Submit the newest camera frame unless an estimation is still running.
    pub fn handle_new_frame(&mut self) -> Result<FrameStep, InputError> {
        if self.estimating {
            return Ok(FrameStep::Skipped);
        }
        if self.worker.is_none() {
            return Ok(FrameStep::NoFrame);
        }

        match self.capture.update() {
            Ok(true) => {}
            Ok(false) => return Ok(FrameStep::NoFrame),
            Err(CaptureError::Disconnected) => {
                return Err(self.fail_fatal(CaptureError::Disconnected.into(), false));
            }
            Err(err) => {
                warn!("camera update failed: {err}");
                return Ok(FrameStep::NoFrame);
            }
        }

        let job = EstimationJob {
            generation: self.generation,
            frame: self.capture.frame().clone(),
            params: self.estimate_params(),
        };
        let submitted = match self.worker.as_ref() {
            Some(worker) => worker.submit(job),
            None => return Ok(FrameStep::NoFrame),
        };
        match submitted {
            Ok(()) => {
                self.estimating = true;
                Ok(FrameStep::Submitted)
            }
            Err(SubmitError::Busy) => Ok(FrameStep::Skipped),
            Err(SubmitError::Disconnected) => {
                let err = InputError::Estimation("pose estimation worker stopped".into());
                Err(self.fail_fatal(err, true))
            }
        }
    }

    /// Feed an estimation result into the eased keypoints and the cursor.
    pub fn apply_poses(&mut self, poses: Vec<Pose>) {
        let pose = poses.into_iter().next();
        if let Some(pose) = &pose {
            self.ease_keypoints(pose);
            self.update_raw_samples();
        }
        self.pose = pose;
        self.core.set_pose_detail(Some(PoseDetail {
            body_part: self.config.body_part,
            pose: self.pose.clone(),
        }));
        self.core.tick(false);
    }

    fn ease_keypoints(&mut self, pose: &Pose) {
        let ease = self.config.keypoint_ease;
        for part in tracked_parts() {
            let raw = pose.part_position(part, self.config.min_part_confidence);
            if !raw.is_finite() {
                continue;
            }
            self.eased_keypoints
                .entry(part)
                .and_modify(|eased| {
                    *eased = if eased.is_finite() {
                        vec2::lerp(*eased, raw, ease, None)
                    } else {
                        raw
                    };
                })
                .or_insert(raw);
        }
    }

    fn update_raw_samples(&mut self) {
        let part = self.part_position(self.config.body_part);
        let canvas = self.capture.dimensions();
        if !part.is_finite() || canvas.x <= 0.0 || canvas.y <= 0.0 {
            return;
        }

        if let Some(element) = self.core.content_element() {
            let dims = element.dimensions();
            if dims.x > 0.0 && dims.y > 0.0 {
                self.preamplified_target_position = self.project_position(part, dims);
                let center = self.source_center.unwrap_or(canvas * 0.5);
                let amplified = amplify(part, center, self.config.amplification);
                self.last_source_position = amplified;

                let mut target = self.project_position(amplified, dims);
                if !self.core.disable_clamp() {
                    target = Vec2::new(clamp(target.x, 0.0, dims.x), clamp(target.y, 0.0, dims.y));
                }
                self.core.set_last_found_target_position(target);
            }
        }

        self.core.set_last_found_position(Vec2::new(
            scalemap(part.x, 0.0, canvas.x, -1.0, 1.0),
            scalemap(part.y, 0.0, canvas.y, -1.0, 1.0),
        ));
    }

    pub fn reset_center(&mut self) {
        self.source_center = Some(self.capture.dimensions() * 0.5);
    }

    /// Recenter on the tracked part. Returns false when it has not been seen.
    pub fn set_center_to_current_position(&mut self) -> bool {
        let position = self.part_position(self.config.body_part);
        if position.is_finite() {
            self.source_center = Some(position);
        }
        position.is_finite()
    }

    pub fn set_amplification(&mut self, amplification: f32) -> Result<(), InputError> {
        check_positive("amplification", amplification)?;
        if self.config.amplification != amplification {
            self.config.amplification = amplification;
            self.core.dispatch_change();
        }
        Ok(())
    }

    pub fn set_body_part(&mut self, part: BodyPart) {
        if self.config.body_part != part {
            self.config.body_part = part;
            self.core.dispatch_change();
        }
    }

    pub fn set_image_scale_factor(&mut self, factor: f32) -> Result<(), InputError> {
        check_range("image_scale_factor", factor, factor > 0.0 && factor <= 1.0)?;
        if self.config.image_scale_factor != factor {
            self.config.image_scale_factor = factor;
            self.core.dispatch_change();
        }
        Ok(())
    }

    pub fn set_keypoint_ease(&mut self, ease: f32) -> Result<(), InputError> {
        check_unit("keypoint_ease", ease)?;
        if self.config.keypoint_ease != ease {
            self.config.keypoint_ease = ease;
            self.core.dispatch_change();
        }
        Ok(())
    }

    pub fn help(&self) -> bool {
        self.help
    }

    pub fn set_help(&mut self, help: bool) {
        if self.help != help {
            self.help = help;
            self.core.dispatch_change();
        }
    }

    /// Eased position of `part` in capture pixels, NaN until first seen.
    pub fn part_position(&self, part: BodyPart) -> Vec2 {
        self.eased_keypoints
            .get(&part)
            .copied()
            .unwrap_or(Vec2::NAN)
    }

    pub fn part_position_normalized(&self, part: BodyPart) -> Vec2 {
        let canvas = self.capture.dimensions();
        if canvas.x <= 0.0 || canvas.y <= 0.0 {
            return Vec2::NAN;
        }
        let p = self.part_position(part);
        Vec2::new(
            scalemap(p.x, 0.0, canvas.x, -1.0, 1.0),
            scalemap(p.y, 0.0, canvas.y, -1.0, 1.0),
        )
    }

    pub fn part_position_projected(&mut self, part: BodyPart) -> Result<Vec2, InputError> {
        self.try_project_position(self.part_position(part))
    }

    /// Map a capture-space point into a `dims` sized surface.
    pub fn project_position(&self, position: Vec2, dims: Vec2) -> Vec2 {
        let canvas = self.capture.dimensions();
        let mut points = [position];
        transform_camera_points(canvas.x, canvas.y, dims.x, dims.y, &mut points);
        points[0]
    }

    /// Project into the bound content element, checking both sizes.
    pub fn try_project_position(&mut self, position: Vec2) -> Result<Vec2, InputError> {
        let element = self
            .core
            .content_element()
            .ok_or(InputError::NoContentElement)?;
        let dims = element.dimensions();
        let canvas = self.capture.dimensions();
        for size in [dims, canvas] {
            if size.x <= 0.0 || size.y <= 0.0 {
                return Err(InputError::Coordinate {
                    width: size.x,
                    height: size.y,
                });
            }
        }
        Ok(self.project_position(position, dims))
    }

    pub fn all_positions_projected(&self, parts: &[BodyPart], dims: Vec2) -> HashMap<BodyPart, Vec2> {
        parts
            .iter()
            .map(|&part| (part, self.project_position(self.part_position(part), dims)))
            .collect()
    }

    pub fn render_center(&self, canvas: &mut RgbaCanvas) {
        if !self.core.is_ready() {
            return;
        }
        let Some(center) = self.source_center else {
            return;
        };
        let center = self.project_position(center, canvas.dimensions());
        canvas.draw_crosshair(center, CENTER_RADIUS, CENTER_COLOR, 3);
    }

    pub fn render_cursor(&self, canvas: &mut RgbaCanvas) {
        if !self.core.is_ready() {
            return;
        }
        let dims = canvas.dimensions();
        let part = self.project_position(self.part_position(self.config.body_part), dims);
        let source = self.project_position(self.last_source_position, dims);
        canvas.draw_line(part, source, CURSOR_COLOR, 1);
        canvas.fill_circle(source, CURSOR_RADIUS, CURSOR_COLOR);
    }

    pub fn render_input_data(&self, canvas: &mut RgbaCanvas) {
        if !self.core.is_ready() {
            return;
        }
        let dims = canvas.dimensions();
        let mut rendered: Vec<BodyPart> = Vec::new();

        for segment in POSE_SEGMENTS {
            let points: Vec<Vec2> = segment
                .iter()
                .map(|&part| self.project_position(self.part_position(part), dims))
                .collect();
            if points.len() > 1 {
                canvas.draw_polyline(&points, SKELETON_COLOR, 1);
            }
            for (&part, &point) in segment.iter().zip(&points) {
                if !rendered.contains(&part) {
                    canvas.fill_circle(point, JOINT_RADIUS, SKELETON_COLOR);
                    rendered.push(part);
                }
            }
        }
    }
}

impl InputSource for PoseInput {
    fn core(&self) -> &InputCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut InputCore {
        &mut self.core
    }

    fn initialize(&mut self) -> Result<(), InputError> {
        self.start()
    }

    fn update(&mut self, now: Instant) -> Result<(), InputError> {
        self.poll(now)
    }

    fn stop(&mut self) {
        self.frame_loop.stop();
        self.generation += 1;
        self.estimating = false;
        self.capture.stop();
        self.core.dispatch_stop();
    }

    fn time_until_next_frame(&self, now: Instant) -> Duration {
        self.frame_loop.time_until_next(now)
    }
}
