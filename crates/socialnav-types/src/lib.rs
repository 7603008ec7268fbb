//! `socialnav-types` – data model shared by every SocialNav crate.
//!
//! Detector output ([`DetectionBatch`]), the aligned [`DepthImage`], the
//! egocentric [`CostMap`][grid::CostMap] and the workspace-wide
//! [`SocialError`] live here so that perception, compositing and transport
//! agree on one vocabulary.

pub mod grid;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use grid::{CostMap, Grid};

// ────────────────────────────────────────────────────────────────────────────
// Keypoint identifiers
// ────────────────────────────────────────────────────────────────────────────

/// Body keypoint roles emitted by the pose detector.
///
/// Indices 0–16 follow the COCO ordering; `Neck` is appended as index 17.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum KeypointId {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
    Neck = 17,
}

impl KeypointId {
    pub const COUNT: usize = 18;

    /// Map a detector index onto a keypoint role.  Unknown indices yield
    /// `None`.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEye),
            2 => Some(Self::RightEye),
            3 => Some(Self::LeftEar),
            4 => Some(Self::RightEar),
            5 => Some(Self::LeftShoulder),
            6 => Some(Self::RightShoulder),
            7 => Some(Self::LeftElbow),
            8 => Some(Self::RightElbow),
            9 => Some(Self::LeftWrist),
            10 => Some(Self::RightWrist),
            11 => Some(Self::LeftHip),
            12 => Some(Self::RightHip),
            13 => Some(Self::LeftKnee),
            14 => Some(Self::RightKnee),
            15 => Some(Self::LeftAnkle),
            16 => Some(Self::RightAnkle),
            17 => Some(Self::Neck),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Detector output
// ────────────────────────────────────────────────────────────────────────────

/// Reference frame and acquisition time of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// e.g. `"camera_link"`
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
}

impl FrameHeader {
    pub fn new(frame_id: impl Into<String>, stamp: DateTime<Utc>) -> Self {
        Self {
            frame_id: frame_id.into(),
            stamp,
        }
    }
}

/// One 2D keypoint as reported by the detector, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeypointObservation {
    pub id: KeypointId,
    pub x: f32,
    pub y: f32,
}

/// One detected person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonDetection {
    /// Identifier assigned by the upstream tracker.  Carried for logging only.
    #[serde(default)]
    pub track_id: Option<u64>,
    /// Planar velocity estimate `(vx, vy)` in m/s, when the tracker has one.
    #[serde(default)]
    pub velocity: Option<(f32, f32)>,
    pub keypoints: Vec<KeypointObservation>,
}

impl PersonDetection {
    /// Magnitude of the velocity estimate; `0.0` when unknown.
    pub fn speed(&self) -> f32 {
        self.velocity.map(|(vx, vy)| vx.hypot(vy)).unwrap_or(0.0)
    }
}

/// Depth frame aligned pixel-for-pixel with the detector image.
///
/// Samples are ranges in metres, row-major.  Zero, negative and non-finite
/// samples mark pixels without a depth reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl DepthImage {
    /// Wrap a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::InvalidDepthFrame`] when `data.len()` does not
    /// equal `width * height`.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self, SocialError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(SocialError::InvalidDepthFrame {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame where every pixel reads `meters`.
    pub fn uniform(width: u32, height: u32, meters: f32) -> Self {
        Self {
            width,
            height,
            data: vec![meters; width as usize * height as usize],
        }
    }

    /// The valid range reading at `(x, y)`, or `None` when the pixel lies
    /// outside the frame or carries no reading.
    pub fn sample(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let value = *self.data.get(y as usize * self.width as usize + x as usize)?;
        (value.is_finite() && value > 0.0).then_some(value)
    }

    /// Overwrite one pixel.  Out-of-frame writes are ignored.
    pub fn set(&mut self, x: u32, y: u32, meters: f32) {
        if x < self.width && y < self.height {
            self.data[y as usize * self.width as usize + x as usize] = meters;
        }
    }
}

/// Everything the detector hands over for one update event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    pub header: FrameHeader,
    pub persons: Vec<PersonDetection>,
    pub depth: DepthImage,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failures that cross crate boundaries.
///
/// Per-person problems (missing depth, missing keypoints, out-of-map
/// positions) are not errors at this level; they are reported through the
/// perception and compositing result types and never abort a cycle.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SocialError {
    #[error("Transform {frame} -> {reference} unavailable: {reason}")]
    TransformUnavailable {
        reference: String,
        frame: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Depth frame holds {actual} samples, expected {expected}")]
    InvalidDepthFrame { expected: usize, actual: usize },

    #[error("Event bus error: {0}")]
    Channel(String),
}
