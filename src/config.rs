//! Input configuration.
//!
//! Every section has defaults, so an empty TOML file is a valid config.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    error::InputError,
    types::{BodyPart, InputType},
};

pub const DEFAULT_FRAME_RATE: u32 = 30;
const VALID_OUTPUT_STRIDES: [u32; 3] = [8, 16, 32];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: InputMode,
    pub content: ContentConfig,
    pub pose: PoseConfig,
    pub mouse: MouseConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Mouse,
    #[default]
    Pose,
}

impl From<InputMode> for InputType {
    fn from(mode: InputMode) -> Self {
        match mode {
            InputMode::Mouse => InputType::Mouse,
            InputMode::Pose => InputType::Pose,
        }
    }
}

/// Settings shared by every input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// 0 reports raw samples, values toward 1 converge more slowly.
    pub smoothing: f32,
    pub content_selector: String,
    pub disable_clamp: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.0,
            content_selector: String::new(),
            disable_clamp: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub input: InputConfig,
    pub amplification: f32,
    pub body_part: BodyPart,
    pub keypoint_ease: f32,
    pub image_scale_factor: f32,
    pub output_stride: u32,
    /// Keypoints scoring below this keep their previous eased position.
    pub min_part_confidence: f32,
    /// Regex matched against the platform string; a match refuses to start.
    pub unsupported_platform_pattern: String,
    /// Replaces the detected platform string, e.g. with a browser user agent.
    pub platform: Option<String>,
    pub capture: CaptureOptions,
    pub model: ModelConfig,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            amplification: 1.0,
            body_part: BodyPart::Nose,
            keypoint_ease: 0.5,
            image_scale_factor: 0.33,
            output_stride: 16,
            min_part_confidence: 0.0,
            unsupported_platform_pattern: r"(iPad|iPhone|CriOS|^ios\b)".to_string(),
            platform: None,
            capture: CaptureOptions::default(),
            model: ModelConfig::default(),
        }
    }
}

impl PoseConfig {
    pub fn platform_string(&self) -> String {
        self.platform.clone().unwrap_or_else(|| {
            format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MouseConfig {
    pub input: InputConfig,
    /// Pixels moved per arrow key press.
    pub amplification: f32,
    pub enable_keyboard: bool,
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            input: InputConfig::default(),
            amplification: 1.0,
            enable_keyboard: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Upper bound on waiting for the first non-empty frame. None waits forever.
    pub first_frame_timeout_ms: Option<u64>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 480,
            frame_rate: DEFAULT_FRAME_RATE,
            first_frame_timeout_ms: None,
        }
    }
}

impl CaptureOptions {
    pub fn first_frame_timeout(&self) -> Option<Duration> {
        self.first_frame_timeout_ms.map(Duration::from_millis)
    }
}

/// Which pose model to load and where to find it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Download source used when `path` does not exist yet.
    pub url: Option<String>,
    pub intra_threads: usize,
    pub min_pose_score: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models").join("movenet_multipose_lightning.onnx"),
            url: None,
            intra_threads: 2,
            min_pose_score: 0.1,
        }
    }
}

/// Demo content surface used by the binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub selector: String,
    pub width: f32,
    pub height: f32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            selector: "#content".to_string(),
            width: 1280.0,
            height: 720.0,
        }
    }
}

pub(crate) fn check_range(name: &'static str, value: f32, ok: bool) -> Result<(), InputError> {
    if ok && !value.is_nan() {
        Ok(())
    } else {
        Err(InputError::OutOfRange { name, value })
    }
}

pub(crate) fn check_unit(name: &'static str, value: f32) -> Result<(), InputError> {
    check_range(name, value, (0.0..=1.0).contains(&value))
}

pub(crate) fn check_positive(name: &'static str, value: f32) -> Result<(), InputError> {
    check_range(name, value, value > 0.0 && value.is_finite())
}

impl InputConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        check_unit("smoothing", self.smoothing)
    }
}

impl PoseConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        self.input.validate()?;
        check_positive("amplification", self.amplification)?;
        check_unit("keypoint_ease", self.keypoint_ease)?;
        check_range(
            "image_scale_factor",
            self.image_scale_factor,
            self.image_scale_factor > 0.0 && self.image_scale_factor <= 1.0,
        )?;
        check_range(
            "output_stride",
            self.output_stride as f32,
            VALID_OUTPUT_STRIDES.contains(&self.output_stride),
        )?;
        check_unit("min_part_confidence", self.min_part_confidence)
    }
}

impl MouseConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        self.input.validate()?;
        check_positive("amplification", self.amplification)
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.pose.validate().context("invalid [pose] section")?;
        self.mouse.validate().context("invalid [mouse] section")?;
        regex::Regex::new(&self.pose.unsupported_platform_pattern)
            .context("invalid pose.unsupported_platform_pattern")?;
        Ok(())
    }
}
