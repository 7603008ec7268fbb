//! Egocentric cost-map compositing.
//!
//! Every cycle starts from a zeroed map centred on the robot.  Each located
//! person picks the kernel of its speed bucket, rotates it to the person's
//! facing direction and is max-merged into the map with both rectangles
//! clipped to the overlap, so a person near the edge is drawn partially and
//! one outside the map is skipped.

use serde::{Deserialize, Serialize};
use socialnav_perception::{Person, Transform3D};
use socialnav_types::{CostMap, FrameHeader};
use tracing::debug;

use crate::proxemics::ProxemicZoneModel;
use crate::rotate::rotate_kernel;

// ────────────────────────────────────────────────────────────────────────────
// MapGeometry
// ────────────────────────────────────────────────────────────────────────────

/// Physical extent and resolution of the social map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapGeometry {
    /// Extent along the robot's forward axis (metres).
    #[serde(default = "default_extent_m")]
    pub width_m: f32,
    /// Extent along the robot's left axis (metres).
    #[serde(default = "default_extent_m")]
    pub height_m: f32,
    /// Metres per cell.
    #[serde(default = "default_resolution_m")]
    pub resolution_m: f32,
    /// Cost at a person's centre; every cell stays within `[0, max_cost]`.
    #[serde(default = "default_max_cost")]
    pub max_cost: f32,
}

fn default_extent_m() -> f32 {
    15.0
}
fn default_resolution_m() -> f32 {
    0.05
}
fn default_max_cost() -> f32 {
    100.0
}

impl Default for MapGeometry {
    fn default() -> Self {
        Self {
            width_m: default_extent_m(),
            height_m: default_extent_m(),
            resolution_m: default_resolution_m(),
            max_cost: default_max_cost(),
        }
    }
}

impl MapGeometry {
    /// `(rows, cols)` of the grid.
    pub fn dims(&self) -> (usize, usize) {
        let rows = (self.height_m / self.resolution_m).round().max(0.0) as usize;
        let cols = (self.width_m / self.resolution_m).round().max(0.0) as usize;
        (rows, cols)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inputs / outputs
// ────────────────────────────────────────────────────────────────────────────

/// A person ready to be drawn: planar position in the sensor frame (forward,
/// left), facing direction when known and walking speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedPerson {
    pub track_id: Option<u64>,
    pub x: f32,
    pub y: f32,
    pub orientation: Option<f32>,
    pub speed: f32,
}

impl LocatedPerson {
    /// `None` when the person has no localisable position.
    pub fn from_person(person: &Person<'_>) -> Option<Self> {
        let (x, y) = person.position().ok()?;
        Some(Self {
            track_id: person.track_id(),
            x,
            y,
            orientation: person.orientation().ok(),
            speed: person.speed(),
        })
    }
}

/// Per-cycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComposeStats {
    pub drawn: usize,
    pub out_of_bounds: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// CostMapCompositor
// ────────────────────────────────────────────────────────────────────────────

/// Stateless map builder.
#[derive(Debug, Clone)]
pub struct CostMapCompositor {
    geometry: MapGeometry,
    apply_rotation: bool,
}

impl CostMapCompositor {
    /// With `apply_rotation == false` only the robot's translation is taken
    /// into account, i.e. the map axes are assumed to be colinear with the
    /// sensor axes.
    pub fn new(geometry: MapGeometry, apply_rotation: bool) -> Self {
        Self {
            geometry,
            apply_rotation,
        }
    }

    pub fn geometry(&self) -> &MapGeometry {
        &self.geometry
    }

    /// Build a fresh map from `persons`.
    ///
    /// `robot` is the robot's pose in the frame the persons are expressed in.
    pub fn compose(
        &self,
        persons: &[LocatedPerson],
        zones: &ProxemicZoneModel,
        robot: &Transform3D,
        header: FrameHeader,
    ) -> (CostMap, ComposeStats) {
        let (rows, cols) = self.geometry.dims();
        let resolution = self.geometry.resolution_m;
        let mut map = CostMap::new(rows, cols, resolution, self.geometry.max_cost, header);
        let (centre_row, centre_col) = map.centre();
        let robot_yaw = robot.rotation.yaw();
        let mut stats = ComposeStats::default();

        for person in persons {
            let mut dx = person.x - robot.translation.x;
            let mut dy = person.y - robot.translation.y;
            let mut orientation = person.orientation.unwrap_or(0.0);
            if self.apply_rotation {
                let (sin, cos) = (-robot_yaw).sin_cos();
                (dx, dy) = (dx * cos - dy * sin, dx * sin + dy * cos);
                orientation -= robot_yaw;
            }

            let Some((row, col)) = cell_of(dx, dy, resolution, (centre_row, centre_col), (rows, cols)) else {
                debug!(track_id = ?person.track_id, dx, dy, "person outside social map");
                stats.out_of_bounds += 1;
                continue;
            };

            let zone = zones.zone_for_speed(person.speed);
            let kernel = rotate_kernel(zone.kernel(), orientation);
            let half_rows = kernel.rows() / 2;
            let half_cols = kernel.cols() / 2;

            let src_origin = (half_rows.saturating_sub(row), half_cols.saturating_sub(col));
            let dst_origin = (row.saturating_sub(half_rows), col.saturating_sub(half_cols));
            map.merge_max(
                dst_origin,
                &kernel,
                src_origin,
                kernel.rows() - src_origin.0,
                kernel.cols() - src_origin.1,
            );
            stats.drawn += 1;
        }

        (map, stats)
    }
}

/// Map cell of offset `(dx, dy)` from the robot, or `None` off the map.
fn cell_of(
    dx: f32,
    dy: f32,
    resolution: f32,
    centre: (usize, usize),
    dims: (usize, usize),
) -> Option<(usize, usize)> {
    if !(dx.is_finite() && dy.is_finite()) {
        return None;
    }
    let col = (dx / resolution).floor() as i64 + centre.1 as i64;
    let row = centre.0 as i64 - (dy / resolution).floor() as i64;
    let in_rows = (0..dims.0 as i64).contains(&row);
    let in_cols = (0..dims.1 as i64).contains(&col);
    (in_rows && in_cols).then_some((row as usize, col as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxemics::{ProxemicParams, ProxemicZone};
    use chrono::{TimeZone, Utc};
    use socialnav_types::Grid;
    use std::f32::consts::FRAC_PI_2;

    fn header() -> FrameHeader {
        FrameHeader::new("camera", Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    }

    fn person(x: f32, y: f32) -> LocatedPerson {
        LocatedPerson {
            track_id: None,
            x,
            y,
            orientation: Some(0.0),
            speed: 0.0,
        }
    }

    fn small_geometry() -> MapGeometry {
        MapGeometry {
            width_m: 1.0,
            height_m: 1.0,
            resolution_m: 0.1,
            max_cost: 1.0,
        }
    }

    fn flat_zones(values: &[(f32, f32)]) -> ProxemicZoneModel {
        let zones = values
            .iter()
            .map(|(speed, v)| ProxemicZone::from_grid(*speed, Grid::from_cells(3, 3, vec![*v; 9]).unwrap()))
            .collect();
        ProxemicZoneModel::from_zones(zones).unwrap()
    }

    fn default_model() -> ProxemicZoneModel {
        ProxemicZoneModel::new(&ProxemicParams::default(), 0.05, 100.0).unwrap()
    }

    #[test]
    fn default_geometry_is_300_cells_square() {
        assert_eq!(MapGeometry::default().dims(), (300, 300));
    }

    #[test]
    fn empty_batch_yields_zero_map() {
        let c = CostMapCompositor::new(MapGeometry::default(), false);
        let (map, stats) = c.compose(&[], &default_model(), &Transform3D::identity(), header());
        assert_eq!((map.rows(), map.cols()), (300, 300));
        assert_eq!(map.grid().max_value(), 0.0);
        assert_eq!(stats, ComposeStats::default());
    }

    #[test]
    fn person_at_robot_peaks_at_centre() {
        let c = CostMapCompositor::new(MapGeometry::default(), false);
        let model = default_model();
        let (map, stats) = c.compose(&[person(0.0, 0.0)], &model, &Transform3D::identity(), header());
        assert_eq!(stats.drawn, 1);
        let peak = map.get(150, 150).unwrap();
        assert!((peak - model.zones()[0].peak()).abs() < 1e-4);
        // Facing forward: more cost one metre ahead than one metre behind.
        assert!(map.get(150, 170).unwrap() > map.get(150, 130).unwrap());
    }

    #[test]
    fn compose_is_idempotent() {
        let c = CostMapCompositor::new(MapGeometry::default(), false);
        let model = default_model();
        let persons = [
            person(2.0, 1.0),
            LocatedPerson {
                orientation: Some(1.2),
                ..person(-3.0, 0.5)
            },
        ];
        let robot = Transform3D::planar(0.5, -0.5, 0.0);
        let (a, _) = c.compose(&persons, &model, &robot, header());
        let (b, _) = c.compose(&persons, &model, &robot, header());
        assert_eq!(a, b);
    }

    #[test]
    fn overlapping_kernels_take_the_maximum() {
        let c = CostMapCompositor::new(small_geometry(), false);
        let zones = flat_zones(&[(0.0, 0.5), (1.0, 0.8)]);
        let slow = person(0.0, 0.0);
        let fast = LocatedPerson {
            speed: 1.0,
            ..person(0.1, 0.0)
        };
        let (map, stats) = c.compose(&[slow, fast], &zones, &Transform3D::identity(), header());
        assert_eq!(stats.drawn, 2);
        // Centre cell (5, 5) is covered by both kernels.
        assert_eq!(map.get(5, 5), Some(0.8));
        assert_eq!(map.get(5, 4), Some(0.5), "only the slow kernel reaches here");
        assert_eq!(map.get(5, 7), Some(0.8), "only the fast kernel reaches here");
        assert_eq!(map.get(5, 8), Some(0.0));
    }

    #[test]
    fn person_on_the_corner_is_clipped() {
        let c = CostMapCompositor::new(small_geometry(), false);
        let zones = flat_zones(&[(0.0, 1.0)]);
        // col = floor(4.5) + 5 = 9, row = 5 − floor(5.5) = 0.
        let (map, stats) = c.compose(&[person(0.45, 0.55)], &zones, &Transform3D::identity(), header());
        assert_eq!(stats.drawn, 1);
        assert_eq!(map.get(0, 9), Some(1.0));
        assert_eq!(map.get(1, 8), Some(1.0));
        assert_eq!(map.grid().cells().iter().filter(|v| **v > 0.0).count(), 4);
    }

    #[test]
    fn person_near_far_corner_of_default_map() {
        let c = CostMapCompositor::new(MapGeometry::default(), false);
        let robot = Transform3D::planar(7.5, 7.5, 0.0);
        let (map, stats) = c.compose(&[person(14.99, 14.99)], &default_model(), &robot, header());
        assert_eq!(stats.drawn, 1);
        assert_eq!((map.rows(), map.cols()), (300, 300));
        assert!(map.get(1, 299).unwrap() > 99.0);
        assert!(map.grid().cells().iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn persons_off_the_map_are_skipped() {
        let c = CostMapCompositor::new(small_geometry(), false);
        let zones = flat_zones(&[(0.0, 1.0)]);
        let persons = [
            person(0.5, 0.0),
            person(-0.6, 0.0),
            person(0.0, -0.5),
            person(f32::NAN, 0.0),
        ];
        let (map, stats) = c.compose(&persons, &zones, &Transform3D::identity(), header());
        assert_eq!(stats, ComposeStats { drawn: 0, out_of_bounds: 4 });
        assert_eq!(map.grid().max_value(), 0.0);
    }

    #[test]
    fn unknown_orientation_draws_canonical_kernel() {
        let c = CostMapCompositor::new(MapGeometry::default(), false);
        let model = default_model();
        let oriented = c.compose(&[person(0.0, 0.0)], &model, &Transform3D::identity(), header()).0;
        let unknown = LocatedPerson {
            orientation: None,
            ..person(0.0, 0.0)
        };
        let fallback = c.compose(&[unknown], &model, &Transform3D::identity(), header()).0;
        assert_eq!(oriented, fallback);
    }

    #[test]
    fn robot_rotation_is_applied_when_enabled() {
        let model = default_model();
        // Robot turned a quarter to the left; a person straight ahead of the
        // sensor ends up on the robot's right.
        let robot = Transform3D::planar(0.0, 0.0, FRAC_PI_2);
        let ahead = [person(2.0, 0.0)];

        let translated = CostMapCompositor::new(MapGeometry::default(), false);
        let (map, _) = translated.compose(&ahead, &model, &robot, header());
        assert!(map.get(150, 190).unwrap() > 99.0);

        let rotated = CostMapCompositor::new(MapGeometry::default(), true);
        let (map, _) = rotated.compose(&ahead, &model, &robot, header());
        assert!(map.get(190, 150).unwrap() > 99.0);
    }
}
