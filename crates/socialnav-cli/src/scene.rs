//! Scene files – recorded detector output replayed through the node.
//!
//! ```json
//! {
//!   "global_map": { "width_m": 30.0, "height_m": 30.0, "resolution_m": 0.1 },
//!   "frames": [
//!     {
//!       "stamp": "2024-05-01T12:00:00Z",
//!       "frame_id": "camera_link",
//!       "robot": { "x": 0.0, "y": 0.0, "yaw": 0.0 },
//!       "world_pose": { "x": 2.0, "y": 1.0, "yaw": 0.0 },
//!       "depth": { "kind": "uniform", "width": 640, "height": 480, "meters": 2.0 },
//!       "persons": [
//!         { "track_id": 1, "velocity": [0.5, 0.0], "keypoints": [
//!             { "id": "left_shoulder", "x": 300.0, "y": 200.0 },
//!             { "id": "right_shoulder", "x": 340.0, "y": 200.0 } ] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `robot` is the robot's pose in the detection frame; a frame without it
//! publishes no transform, so its cycle is abandoned.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use socialnav_costmap::LayeredGrid;
use socialnav_perception::Transform3D;
use socialnav_types::{DepthImage, DetectionBatch, FrameHeader, PersonDetection, SocialError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scene {
    /// When present, every map is also stamped into a global grid.
    #[serde(default)]
    pub global_map: Option<GlobalMapSpec>,
    pub frames: Vec<SceneFrame>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalMapSpec {
    #[serde(default = "default_global_extent")]
    pub width_m: f32,
    #[serde(default = "default_global_extent")]
    pub height_m: f32,
    #[serde(default = "default_global_resolution")]
    pub resolution_m: f32,
}

fn default_global_extent() -> f32 {
    30.0
}
fn default_global_resolution() -> f32 {
    0.1
}

impl GlobalMapSpec {
    /// Empty grid centred on the world origin.
    pub fn grid(&self) -> LayeredGrid {
        let size_x = (self.width_m / self.resolution_m).round().max(1.0) as usize;
        let size_y = (self.height_m / self.resolution_m).round().max(1.0) as usize;
        LayeredGrid::new(size_x, size_y, self.resolution_m, -self.width_m / 2.0, -self.height_m / 2.0)
    }
}

/// Planar pose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Pose2D {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub yaw: f32,
}

impl Pose2D {
    pub fn transform(self) -> Transform3D {
        Transform3D::planar(self.x, self.y, self.yaw)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DepthSpec {
    Uniform { width: u32, height: u32, meters: f32 },
    Raw { width: u32, height: u32, data: Vec<f32> },
}

impl DepthSpec {
    pub fn into_image(self) -> Result<DepthImage, SocialError> {
        match self {
            DepthSpec::Uniform { width, height, meters } => Ok(DepthImage::uniform(width, height, meters)),
            DepthSpec::Raw { width, height, data } => DepthImage::new(width, height, data),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneFrame {
    pub stamp: DateTime<Utc>,
    #[serde(default = "default_frame_id")]
    pub frame_id: String,
    #[serde(default)]
    pub robot: Option<Pose2D>,
    #[serde(default)]
    pub world_pose: Option<Pose2D>,
    pub depth: DepthSpec,
    #[serde(default)]
    pub persons: Vec<PersonDetection>,
}

fn default_frame_id() -> String {
    "camera_link".to_string()
}

impl SceneFrame {
    pub fn to_batch(&self) -> Result<DetectionBatch, SocialError> {
        Ok(DetectionBatch {
            header: FrameHeader::new(self.frame_id.clone(), self.stamp),
            persons: self.persons.clone(),
            depth: self.depth.clone().into_image()?,
        })
    }
}

/// Read and parse a scene file.
pub fn load(path: &Path) -> Result<Scene, String> {
    let raw = fs::read_to_string(path).map_err(|e| format!("Failed to read scene at {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| format!("Failed to parse scene: {}", e))
}
