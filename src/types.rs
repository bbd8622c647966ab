use std::{fmt, str::FromStr, time::Instant};

use serde::{Deserialize, Serialize};

use crate::vec2::Vec2;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            rgba: vec![0u8; width as usize * height as usize * 4],
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Mouse,
    Pose,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Mouse => "mouse",
            InputType::Pose => "pose",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    /// Midpoint between the shoulders, not a model keypoint.
    Sternum,
}

/// Model keypoint order (COCO).
pub const KEYPOINT_PARTS: [BodyPart; 17] = [
    BodyPart::Nose,
    BodyPart::LeftEye,
    BodyPart::RightEye,
    BodyPart::LeftEar,
    BodyPart::RightEar,
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftElbow,
    BodyPart::RightElbow,
    BodyPart::LeftWrist,
    BodyPart::RightWrist,
    BodyPart::LeftHip,
    BodyPart::RightHip,
    BodyPart::LeftKnee,
    BodyPart::RightKnee,
    BodyPart::LeftAnkle,
    BodyPart::RightAnkle,
];

/// Parts offered by calibration UIs.
pub const SELECTABLE_PARTS: [BodyPart; 9] = [
    BodyPart::Nose,
    BodyPart::LeftWrist,
    BodyPart::RightWrist,
    BodyPart::LeftElbow,
    BodyPart::RightElbow,
    BodyPart::LeftKnee,
    BodyPart::RightKnee,
    BodyPart::LeftAnkle,
    BodyPart::RightAnkle,
];

impl BodyPart {
    pub fn name(&self) -> &'static str {
        match self {
            BodyPart::Nose => "nose",
            BodyPart::LeftEye => "leftEye",
            BodyPart::RightEye => "rightEye",
            BodyPart::LeftEar => "leftEar",
            BodyPart::RightEar => "rightEar",
            BodyPart::LeftShoulder => "leftShoulder",
            BodyPart::RightShoulder => "rightShoulder",
            BodyPart::LeftElbow => "leftElbow",
            BodyPart::RightElbow => "rightElbow",
            BodyPart::LeftWrist => "leftWrist",
            BodyPart::RightWrist => "rightWrist",
            BodyPart::LeftHip => "leftHip",
            BodyPart::RightHip => "rightHip",
            BodyPart::LeftKnee => "leftKnee",
            BodyPart::RightKnee => "rightKnee",
            BodyPart::LeftAnkle => "leftAnkle",
            BodyPart::RightAnkle => "rightAnkle",
            BodyPart::Sternum => "sternum",
        }
    }

    /// Label as the user sees it. The camera view is mirrored, so the
    /// model's left is the user's right.
    pub fn display_name(&self) -> &'static str {
        match self {
            BodyPart::Nose => "Nose",
            BodyPart::LeftEye => "Right Eye",
            BodyPart::RightEye => "Left Eye",
            BodyPart::LeftEar => "Right Ear",
            BodyPart::RightEar => "Left Ear",
            BodyPart::LeftShoulder => "Right Shoulder",
            BodyPart::RightShoulder => "Left Shoulder",
            BodyPart::LeftElbow => "Right Elbow",
            BodyPart::RightElbow => "Left Elbow",
            BodyPart::LeftWrist => "Right Wrist",
            BodyPart::RightWrist => "Left Wrist",
            BodyPart::LeftHip => "Right Hip",
            BodyPart::RightHip => "Left Hip",
            BodyPart::LeftKnee => "Right Knee",
            BodyPart::RightKnee => "Left Knee",
            BodyPart::LeftAnkle => "Right Ankle",
            BodyPart::RightAnkle => "Left Ankle",
            BodyPart::Sternum => "Sternum",
        }
    }

    pub fn from_display_name(label: &str) -> Option<BodyPart> {
        KEYPOINT_PARTS
            .iter()
            .chain(std::iter::once(&BodyPart::Sternum))
            .copied()
            .find(|part| part.display_name() == label)
    }

    pub fn keypoint_index(&self) -> Option<usize> {
        KEYPOINT_PARTS.iter().position(|part| part == self)
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownBodyPart(pub String);

impl fmt::Display for UnknownBodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown body part `{}`", self.0)
    }
}

impl std::error::Error for UnknownBodyPart {}

impl FromStr for BodyPart {
    type Err = UnknownBodyPart;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KEYPOINT_PARTS
            .iter()
            .chain(std::iter::once(&BodyPart::Sternum))
            .copied()
            .find(|part| part.name() == s)
            .ok_or_else(|| UnknownBodyPart(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub part: BodyPart,
    pub position: Vec2,
    pub score: f32,
}

/// One detected person, keypoints in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Pose {
    pub score: f32,
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn keypoint(&self, part: BodyPart) -> Option<&Keypoint> {
        let idx = part.keypoint_index()?;
        self.keypoints.get(idx)
    }

    /// Raw position of `part`, NaN when the keypoint is missing or below
    /// `min_score`.
    pub fn part_position(&self, part: BodyPart, min_score: f32) -> Vec2 {
        let lookup = |p: BodyPart| {
            self.keypoint(p)
                .filter(|kp| kp.score >= min_score)
                .map(|kp| kp.position)
        };

        if part == BodyPart::Sternum {
            return match (lookup(BodyPart::LeftShoulder), lookup(BodyPart::RightShoulder)) {
                (Some(l), Some(r)) => {
                    Vec2::new((l.x - r.x) * 0.5 + r.x, (l.y - r.y) * 0.5 + r.y)
                }
                _ => Vec2::NAN,
            };
        }

        lookup(part).unwrap_or(Vec2::NAN)
    }
}
