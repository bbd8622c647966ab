use std::cmp::Ordering;

use anyhow::{Context, Result, anyhow, ensure};
use fast_image_resize as fir;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use super::{EstimateParams, ModelLoader, PoseEstimator};
use crate::{
    config::ModelConfig,
    model_download::ensure_pose_model_ready,
    types::{Frame, KEYPOINT_PARTS, Keypoint, Pose},
    vec2::Vec2,
};

// MoveNet multipose wants input sides that are multiples of 32.
const MIN_INPUT_MULTIPLE: u32 = 32;
// 17 keypoints of (y, x, score), then ymin, xmin, ymax, xmax, score.
const VALUES_PER_DETECTION: usize = 56;
const POSE_SCORE_INDEX: usize = 55;

/// Loads the MoveNet multipose ONNX model, downloading it first if needed.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrtModelLoader;

impl ModelLoader for OrtModelLoader {
    fn load(&self, model: &ModelConfig) -> Result<Box<dyn PoseEstimator>> {
        ensure_pose_model_ready(&model.path, model.url.as_deref(), |_evt| {})?;
        let engine = MoveNetEngine::new(model)?;
        log::info!("pose ORT backend ready using {}", model.path.display());
        Ok(Box::new(engine))
    }
}

struct MoveNetEngine {
    session: Session,
    min_pose_score: f32,
}

impl MoveNetEngine {
    fn new(model: &ModelConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(model.intra_threads)?
            .commit_from_file(&model.path)
            .with_context(|| {
                format!("failed to load ORT session from {}", model.path.display())
            })?;

        Ok(Self {
            session,
            min_pose_score: model.min_pose_score,
        })
    }
}

impl PoseEstimator for MoveNetEngine {
    fn estimate(&mut self, frame: &Frame, params: &EstimateParams) -> Result<Vec<Pose>> {
        let (input_w, input_h) = input_dims(
            frame.width,
            frame.height,
            params.image_scale_factor,
            params.output_stride,
        );
        let input = prepare_input(frame, input_w, input_h)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run MoveNet session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }
        let raw = outputs[0].try_extract_array::<f32>()?;
        let shape = raw.shape().to_vec();
        let flattened: Vec<f32> = raw.iter().copied().collect();

        decode_multipose(
            &flattened,
            &shape,
            frame.width as f32,
            frame.height as f32,
            params,
            self.min_pose_score,
        )
    }
}

/// Model input size for a frame: each side scaled and rounded up to a
/// multiple of the output stride (at least 32).
pub fn input_dims(width: u32, height: u32, scale: f32, output_stride: u32) -> (u32, u32) {
    let multiple = output_stride.max(MIN_INPUT_MULTIPLE);
    let side = |value: u32| {
        let scaled = (value as f32 * scale).round().max(1.0) as u32;
        scaled.div_ceil(multiple) * multiple
    };
    (side(width), side(height))
}

fn prepare_input(frame: &Frame, input_w: u32, input_h: u32) -> Result<Array4<i32>> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    ensure!(
        frame.rgba.len() == expected_len,
        "frame buffer size mismatch: got {}, expected {expected_len}",
        frame.rgba.len()
    );

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(input_w, input_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let rgb: Vec<i32> = resized
        .par_chunks_exact(4)
        .flat_map_iter(|px| [px[0] as i32, px[1] as i32, px[2] as i32])
        .collect();
    Array4::<i32>::from_shape_vec((1, input_h as usize, input_w as usize, 3), rgb)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))
}

/// Turn raw `[1, N, 56]` detections into poses in frame pixel coordinates,
/// best first.
pub fn decode_multipose(
    flat: &[f32],
    shape: &[usize],
    frame_w: f32,
    frame_h: f32,
    params: &EstimateParams,
    min_pose_score: f32,
) -> Result<Vec<Pose>> {
    ensure!(
        shape.len() == 3 && shape[2] == VALUES_PER_DETECTION,
        "unexpected MoveNet output shape {shape:?}"
    );
    let detections = shape[1];
    ensure!(
        flat.len() >= detections * VALUES_PER_DETECTION,
        "MoveNet output too short: {} values for {detections} detections",
        flat.len()
    );

    let mut poses: Vec<Pose> = flat
        .chunks_exact(VALUES_PER_DETECTION)
        .take(detections)
        .filter(|det| det[POSE_SCORE_INDEX] >= min_pose_score)
        .map(|det| {
            let keypoints = KEYPOINT_PARTS
                .iter()
                .enumerate()
                .map(|(i, &part)| {
                    let y = det[i * 3] * frame_h;
                    let mut x = det[i * 3 + 1] * frame_w;
                    if params.flip_horizontal {
                        x = frame_w - x;
                    }
                    Keypoint {
                        part,
                        position: Vec2::new(x, y),
                        score: det[i * 3 + 2],
                    }
                })
                .collect();
            Pose {
                score: det[POSE_SCORE_INDEX],
                keypoints,
            }
        })
        .collect();

    poses.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    poses.truncate(params.max_detections);
    Ok(poses)
}
