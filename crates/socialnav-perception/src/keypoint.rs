//! Keypoint localisation: 2-D pixel + depth patch → 3-D point.
//!
//! Output points use the sensor-centric convention x = forward, y = left,
//! z = up (metres).
//!
//! # Algorithm
//!
//! ```text
//! cx    = res_x/2 − u          cy = res_y/2 − v        (left / up positive)
//! f     = (res_x/2) / tan(hfov/2)
//! gamma = atan2(cx, f)                                  horizontal angle
//! delta = atan2(cy, sqrt(f² + cx²))                     vertical angle
//! d     = median of valid depth samples in the (2r+1)² patch around (u, v)
//! up    = d·sin(delta);  h = d·cos(delta)
//! fwd   = h·cos(gamma);  left = h·sin(gamma)
//! ```
//!
//! A patch without a single valid sample yields `None`: the point is
//! undefined, which callers treat as "missing" rather than as an error.

use socialnav_types::{DepthImage, KeypointId, KeypointObservation};

use crate::camera::CameraModel;
use crate::transform::Vec3;

/// One body keypoint of a [`Person`][crate::person::Person].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub id: KeypointId,
    /// Pixel column.
    pub image_x: f32,
    /// Pixel row.
    pub image_y: f32,
    /// Result of the most recent [`Keypoint::localize`] call; `None` before
    /// localisation or when the depth patch was empty.
    pub position: Option<Vec3>,
}

impl Keypoint {
    pub fn new(id: KeypointId, image_x: f32, image_y: f32) -> Self {
        Self {
            id,
            image_x,
            image_y,
            position: None,
        }
    }

    /// Localise this keypoint, remember and return the result.
    pub fn localize(&mut self, depth: &DepthImage, camera: &CameraModel, radius: u32) -> Option<Vec3> {
        self.position = localize_pixel(self.image_x, self.image_y, depth, camera, radius);
        self.position
    }
}

impl From<KeypointObservation> for Keypoint {
    fn from(obs: KeypointObservation) -> Self {
        Self::new(obs.id, obs.x, obs.y)
    }
}

/// Project pixel `(u, v)` into the sensor frame using the depth patch of
/// half-width `radius` around it.
pub fn localize_pixel(u: f32, v: f32, depth: &DepthImage, camera: &CameraModel, radius: u32) -> Option<Vec3> {
    let range = patch_median(depth, u, v, radius)?;

    let (centre_x, centre_y) = camera.centre();
    let cx = centre_x - u;
    let cy = centre_y - v;

    let focal = camera.focal_px();
    let gamma = cx.atan2(focal);
    let delta = cy.atan2(focal.hypot(cx));

    let up = range * delta.sin();
    let horizontal = range * delta.cos();
    Some(Vec3::new(horizontal * gamma.cos(), horizontal * gamma.sin(), up))
}

/// Median of the valid samples in the `(2·radius + 1)²` patch centred on
/// `(u, v)`, clipped to the frame.  Even counts average the two middle
/// samples.
pub fn patch_median(depth: &DepthImage, u: f32, v: f32, radius: u32) -> Option<f32> {
    if !u.is_finite() || !v.is_finite() {
        return None;
    }
    let r = i64::from(radius);
    // Anything further out than the patch radius misses the frame either way;
    // clamping keeps the window arithmetic in range.
    let reach = radius as f32 + 1.0;
    let px = u.clamp(-reach, depth.width as f32 + reach).floor() as i64;
    let py = v.clamp(-reach, depth.height as f32 + reach).floor() as i64;

    let x0 = (px - r).max(0);
    let x1 = (px + r).min(i64::from(depth.width) - 1);
    let y0 = (py - r).max(0);
    let y1 = (py + r).min(i64::from(depth.height) - 1);
    if x0 > x1 || y0 > y1 {
        return None;
    }

    let mut samples: Vec<f32> = (y0..=y1)
        .flat_map(|y| (x0..=x1).map(move |x| (x as u32, y as u32)))
        .filter_map(|(x, y)| depth.sample(x, y))
        .collect();
    if samples.is_empty() {
        return None;
    }

    let even = samples.len() % 2 == 0;
    let mid = samples.len() / 2;
    let (lower, upper, _) = samples.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *upper;
    if even {
        let below = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        return Some((below + upper) / 2.0);
    }
    Some(upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraModel {
        CameraModel::default()
    }

    #[test]
    fn centre_pixel_projects_straight_ahead() {
        let depth = DepthImage::uniform(640, 480, 2.0);
        let p = localize_pixel(320.0, 240.0, &depth, &camera(), 2).unwrap();
        assert!((p.x - 2.0).abs() < 1e-5);
        assert!(p.y.abs() < 1e-6);
        assert!(p.z.abs() < 1e-6);
    }

    #[test]
    fn pixel_left_of_centre_has_positive_left_component() {
        let depth = DepthImage::uniform(640, 480, 3.0);
        let p = localize_pixel(100.0, 240.0, &depth, &camera(), 2).unwrap();
        assert!(p.y > 0.0, "left = {}", p.y);
        assert!(p.x > 0.0);
        // The range is preserved by the decomposition.
        let range = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
        assert!((range - 3.0).abs() < 1e-4);
    }

    #[test]
    fn pixel_above_centre_has_positive_up_component() {
        let depth = DepthImage::uniform(640, 480, 3.0);
        let p = localize_pixel(320.0, 40.0, &depth, &camera(), 1).unwrap();
        assert!(p.z > 0.0);
        assert!(p.y.abs() < 1e-6);
    }

    #[test]
    fn horizontal_angle_matches_field_of_view_edge() {
        // At the right image border the ray sits half the HFOV to the right.
        let cam = camera();
        let depth = DepthImage::uniform(640, 480, 1.0);
        let p = localize_pixel(640.0, 240.0, &depth, &cam, 1).unwrap();
        let gamma = p.y.atan2(p.x);
        assert!((gamma + (cam.hfov_deg / 2.0).to_radians()).abs() < 1e-4, "gamma {gamma}");
    }

    #[test]
    fn all_zero_patch_is_undefined() {
        let depth = DepthImage::uniform(640, 480, 0.0);
        assert!(localize_pixel(320.0, 240.0, &depth, &camera(), 2).is_none());

        let mut kp = Keypoint::new(KeypointId::Neck, 320.0, 240.0);
        assert!(kp.localize(&depth, &camera(), 2).is_none());
        assert!(kp.position.is_none());
    }

    #[test]
    fn median_ignores_invalid_samples() {
        let mut depth = DepthImage::uniform(5, 5, 0.0);
        depth.set(1, 1, 1.0);
        depth.set(2, 2, 2.0);
        depth.set(3, 3, 9.0);
        assert_eq!(patch_median(&depth, 2.0, 2.0, 1), Some(2.0));
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let mut depth = DepthImage::uniform(3, 3, 0.0);
        depth.set(0, 0, 1.0);
        depth.set(1, 0, 2.0);
        depth.set(2, 0, 4.0);
        depth.set(0, 1, 10.0);
        assert_eq!(patch_median(&depth, 1.0, 1.0, 1), Some(3.0));
    }

    #[test]
    fn patch_is_clipped_at_the_border() {
        let depth = DepthImage::uniform(4, 4, 1.5);
        assert_eq!(patch_median(&depth, 0.0, 0.0, 3), Some(1.5));
        assert_eq!(patch_median(&depth, 3.9, 3.9, 1), Some(1.5));
        assert_eq!(patch_median(&depth, 50.0, 2.0, 1), None, "patch entirely outside");
        assert_eq!(patch_median(&depth, f32::NAN, 2.0, 1), None);
        assert_eq!(patch_median(&depth, 1.0e30, 2.0, 1), None);
        assert_eq!(patch_median(&depth, -1.0e30, 2.0, 1), None);
        assert_eq!(patch_median(&depth, -1.0e30, -1.0e30, 1), None);
    }

    #[test]
    fn huge_keypoint_coordinates_do_not_localize() {
        let depth = DepthImage::uniform(640, 480, 2.0);
        assert_eq!(localize_pixel(1.0e30, 240.0, &depth, &camera(), 2), None);
        assert_eq!(localize_pixel(320.0, -1.0e30, &depth, &camera(), 2), None);
    }

    #[test]
    fn localize_records_position() {
        let depth = DepthImage::uniform(640, 480, 2.5);
        let mut kp: Keypoint = KeypointObservation {
            id: KeypointId::LeftHip,
            x: 320.0,
            y: 240.0,
        }
        .into();
        let p = kp.localize(&depth, &camera(), 1);
        assert_eq!(kp.position, p);
        assert!(p.is_some());
    }
}
