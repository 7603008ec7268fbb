//! Person pose estimation: keypoint set + depth → planar position and facing
//! direction.
//!
//! # Orientation
//!
//! Strict two-tier priority, first usable pair wins:
//!
//! 1. left + right shoulder,
//! 2. left + right hip.
//!
//! A pair is usable when both keypoints were detected *and* both localise.
//! For a pair with horizontal coordinates `(lx, ly)` and `(rx, ry)`:
//!
//! ```text
//! bearing     = atan2(ly − ry, rx − lx)      (+2π when negative)
//! orientation = (π/2 − bearing) mod 2π
//! ```
//!
//! i.e. the normal of the shoulder/hip line, in `[0, 2π)`.  A person facing
//! the sensor gets `π`.
//!
//! # Position
//!
//! Mean forward/left of every torso keypoint (neck, shoulders, hips) that
//! localises with the smaller position radius.

use std::f32::consts::{FRAC_PI_2, TAU};

use serde::{Deserialize, Serialize};
use socialnav_types::{DepthImage, KeypointId, PersonDetection};
use thiserror::Error;

use crate::camera::CameraModel;
use crate::keypoint::Keypoint;
use crate::transform::Vec3;

/// Keypoint pairs tried for orientation, in priority order.
const ORIENTATION_PAIRS: [(KeypointId, KeypointId); 2] = [
    (KeypointId::LeftShoulder, KeypointId::RightShoulder),
    (KeypointId::LeftHip, KeypointId::RightHip),
];

/// Keypoints averaged into the position estimate.
const POSITION_CANDIDATES: [KeypointId; 5] = [
    KeypointId::Neck,
    KeypointId::LeftShoulder,
    KeypointId::RightShoulder,
    KeypointId::LeftHip,
    KeypointId::RightHip,
];

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Why a person has no orientation.  The person is still placed on the map.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationError {
    #[error("neither a shoulder pair nor a hip pair was detected")]
    InsufficientKeypoints,
    #[error("no detected shoulder or hip pair could be localised")]
    MissingDepth,
}

/// Why a person has no position.  The person is left off the map.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionError {
    #[error("no torso keypoint could be localised")]
    NoLocalizablePosition,
}

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Depth patch half-widths (pixels) used by the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSampling {
    #[serde(default = "default_orientation_radius")]
    pub orientation_radius: u32,
    #[serde(default = "default_position_radius")]
    pub position_radius: u32,
}

fn default_orientation_radius() -> u32 {
    2
}
fn default_position_radius() -> u32 {
    1
}

impl Default for DepthSampling {
    fn default() -> Self {
        Self {
            orientation_radius: default_orientation_radius(),
            position_radius: default_position_radius(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Person
// ────────────────────────────────────────────────────────────────────────────

/// One detected person for the duration of a single update cycle.
///
/// Keypoints are stored in a table indexed by [`KeypointId`]; a missing
/// keypoint is an explicit `None`.
#[derive(Debug, Clone)]
pub struct Person<'a> {
    keypoints: [Option<Keypoint>; KeypointId::COUNT],
    depth: &'a DepthImage,
    track_id: Option<u64>,
    speed: f32,
    position: Result<(f32, f32), PositionError>,
    orientation: Result<f32, OrientationError>,
}

impl<'a> Person<'a> {
    /// Build a person from detector output.  Position and orientation stay
    /// invalid until [`PoseEstimator::estimate`] runs.
    ///
    /// Repeated keypoint identifiers keep the last observation.
    pub fn new(detection: &PersonDetection, depth: &'a DepthImage) -> Self {
        let mut keypoints = [None; KeypointId::COUNT];
        for obs in &detection.keypoints {
            keypoints[obs.id.index()] = Some(Keypoint::from(*obs));
        }
        Self {
            keypoints,
            depth,
            track_id: detection.track_id,
            speed: detection.speed(),
            position: Err(PositionError::NoLocalizablePosition),
            orientation: Err(OrientationError::InsufficientKeypoints),
        }
    }

    pub fn keypoint(&self, id: KeypointId) -> Option<&Keypoint> {
        self.keypoints[id.index()].as_ref()
    }

    pub fn track_id(&self) -> Option<u64> {
        self.track_id
    }

    /// Speed reported by the tracker (m/s), `0.0` when unknown.
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Planar `(forward, left)` position in the sensor frame (metres).
    pub fn position(&self) -> Result<(f32, f32), PositionError> {
        self.position
    }

    /// Facing direction in the sensor frame, radians in `[0, 2π)`.
    pub fn orientation(&self) -> Result<f32, OrientationError> {
        self.orientation
    }

    fn localize(&mut self, id: KeypointId, camera: &CameraModel, radius: u32) -> Option<Vec3> {
        let depth = self.depth;
        self.keypoints[id.index()].as_mut()?.localize(depth, camera, radius)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PoseEstimator
// ────────────────────────────────────────────────────────────────────────────

/// Derives position and orientation for [`Person`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseEstimator {
    camera: CameraModel,
    sampling: DepthSampling,
}

impl PoseEstimator {
    pub fn new(camera: CameraModel, sampling: DepthSampling) -> Self {
        Self { camera, sampling }
    }

    /// Fill in the person's orientation and position.
    ///
    /// Orientation is estimated first; the keypoints' stored 3-D positions
    /// afterwards reflect the position pass.
    pub fn estimate(&self, person: &mut Person<'_>) {
        person.orientation = self.orientation(person);
        person.position = self.position(person);
    }

    fn orientation(&self, person: &mut Person<'_>) -> Result<f32, OrientationError> {
        let radius = self.sampling.orientation_radius;
        let mut detected_pair = false;

        for (left_id, right_id) in ORIENTATION_PAIRS {
            if person.keypoint(left_id).is_none() || person.keypoint(right_id).is_none() {
                continue;
            }
            detected_pair = true;
            let left = person.localize(left_id, &self.camera, radius);
            let right = person.localize(right_id, &self.camera, radius);
            if let (Some(left), Some(right)) = (left, right) {
                return Ok(orientation_from_pair(left, right));
            }
        }

        Err(if detected_pair {
            OrientationError::MissingDepth
        } else {
            OrientationError::InsufficientKeypoints
        })
    }

    fn position(&self, person: &mut Person<'_>) -> Result<(f32, f32), PositionError> {
        let radius = self.sampling.position_radius;
        let located: Vec<Vec3> = POSITION_CANDIDATES
            .iter()
            .filter_map(|id| person.localize(*id, &self.camera, radius))
            .collect();

        if located.is_empty() {
            return Err(PositionError::NoLocalizablePosition);
        }
        let n = located.len() as f32;
        let forward = located.iter().map(|p| p.x).sum::<f32>() / n;
        let left = located.iter().map(|p| p.y).sum::<f32>() / n;
        Ok((forward, left))
    }
}

/// Facing direction of a body whose left and right keypoints sit at `left`
/// and `right` (sensor frame), in `[0, 2π)`.
pub fn orientation_from_pair(left: Vec3, right: Vec3) -> f32 {
    let mut bearing = (left.y - right.y).atan2(right.x - left.x);
    if bearing < 0.0 {
        bearing += TAU;
    }
    wrap_angle(FRAC_PI_2 - bearing)
}

/// Wrap any angle into `[0, 2π)`.
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly 2π for tiny negative inputs.
    if wrapped >= TAU { 0.0 } else { wrapped }
}
