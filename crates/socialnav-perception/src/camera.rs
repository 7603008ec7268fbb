//! Pinhole description of the depth-aligned camera.

use serde::{Deserialize, Serialize};

/// Resolution and field of view of the camera whose pixels the detector
/// reports.
///
/// Pixels are assumed square: the focal length is derived from the horizontal
/// field of view alone and `vfov_deg` is only used to check that assumption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    #[serde(default = "default_resolution_x")]
    pub resolution_x: u32,
    #[serde(default = "default_resolution_y")]
    pub resolution_y: u32,
    /// Horizontal field of view (degrees).
    #[serde(default = "default_hfov_deg")]
    pub hfov_deg: f32,
    /// Vertical field of view (degrees).
    #[serde(default = "default_vfov_deg")]
    pub vfov_deg: f32,
}

fn default_resolution_x() -> u32 {
    640
}
fn default_resolution_y() -> u32 {
    480
}
fn default_hfov_deg() -> f32 {
    54.732
}
fn default_vfov_deg() -> f32 {
    42.4115
}

impl Default for CameraModel {
    fn default() -> Self {
        Self {
            resolution_x: default_resolution_x(),
            resolution_y: default_resolution_y(),
            hfov_deg: default_hfov_deg(),
            vfov_deg: default_vfov_deg(),
        }
    }
}

impl CameraModel {
    /// Distance (pixels) from the optical centre to the virtual image plane.
    pub fn focal_px(&self) -> f32 {
        (self.resolution_x as f32 / 2.0) / (self.hfov_deg.to_radians() / 2.0).tan()
    }

    /// Image centre `(cx, cy)` in pixels.
    pub fn centre(&self) -> (f32, f32) {
        (self.resolution_x as f32 / 2.0, self.resolution_y as f32 / 2.0)
    }

    /// Vertical field of view implied by [`CameraModel::focal_px`] and the
    /// image height.
    pub fn implied_vfov_deg(&self) -> f32 {
        (2.0 * ((self.resolution_y as f32 / 2.0) / self.focal_px()).atan()).to_degrees()
    }

    /// Relative disagreement between the configured and the implied vertical
    /// field of view; non-zero values mean the pixels are not square.
    pub fn aspect_mismatch(&self) -> f32 {
        if self.vfov_deg <= 0.0 {
            return f32::INFINITY;
        }
        (self.implied_vfov_deg() - self.vfov_deg).abs() / self.vfov_deg
    }
}
