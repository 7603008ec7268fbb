//! Global-grid consumer of social maps.
//!
//! [`SocialLayer`] keeps the most recent social map together with the pose
//! its origin had in the global frame when it was recorded, and stamps it into
//! a [`LayeredGrid`] on request.

use std::sync::Arc;

use socialnav_perception::Transform3D;
use socialnav_perception::transform::Vec3;
use socialnav_types::CostMap;
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// LayeredGrid
// ────────────────────────────────────────────────────────────────────────────

/// Global 8-bit cost grid.  Cell `(mx, my)` covers
/// `[origin + m·resolution, origin + (m+1)·resolution)` on each axis.
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredGrid {
    size_x: usize,
    size_y: usize,
    resolution: f32,
    origin_x: f32,
    origin_y: f32,
    cells: Vec<u8>,
}

impl LayeredGrid {
    pub fn new(size_x: usize, size_y: usize, resolution: f32, origin_x: f32, origin_y: f32) -> Self {
        Self {
            size_x,
            size_y,
            resolution,
            origin_x,
            origin_y,
            cells: vec![0; size_x * size_y],
        }
    }

    pub fn size_x(&self) -> usize {
        self.size_x
    }

    pub fn size_y(&self) -> usize {
        self.size_y
    }

    /// Row-major (`y` major) cell buffer.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Cell containing world point `(wx, wy)`, or `None` off the grid.
    pub fn world_to_map(&self, wx: f32, wy: f32) -> Option<(usize, usize)> {
        // Keeps points on a cell boundary (e.g. 1.5 at 0.1 m) in the upper cell
        // despite division noise.
        const EPSILON: f32 = 1e-4;
        let mx = ((wx - self.origin_x) / self.resolution + EPSILON).floor();
        let my = ((wy - self.origin_y) / self.resolution + EPSILON).floor();
        if !(mx.is_finite() && my.is_finite()) || mx < 0.0 || my < 0.0 {
            return None;
        }
        let (mx, my) = (mx as usize, my as usize);
        (mx < self.size_x && my < self.size_y).then_some((mx, my))
    }

    pub fn get(&self, mx: usize, my: usize) -> Option<u8> {
        (mx < self.size_x && my < self.size_y).then(|| self.cells[my * self.size_x + mx])
    }

    pub fn set(&mut self, mx: usize, my: usize, cost: u8) {
        if mx < self.size_x && my < self.size_y {
            self.cells[my * self.size_x + mx] = cost;
        }
    }

    fn raise(&mut self, mx: usize, my: usize, cost: u8) {
        let cell = &mut self.cells[my * self.size_x + mx];
        *cell = (*cell).max(cost);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SocialLayer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SocialLayer {
    enabled: bool,
    latest: Option<(Arc<CostMap>, Transform3D)>,
}

impl SocialLayer {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, latest: None }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Remember `map`, recorded while its centre sat at `pose` in the global
    /// frame.  Replaces any previous map.
    pub fn receive(&mut self, map: Arc<CostMap>, pose: Transform3D) {
        self.latest = Some((map, pose));
    }

    /// Max-combine the latest social map into `master`.  Returns the number of
    /// cells written.
    pub fn update_costs(&self, master: &mut LayeredGrid) -> usize {
        if !self.enabled {
            return 0;
        }
        let Some((map, pose)) = &self.latest else {
            return 0;
        };

        let costs = map.to_u8();
        let (centre_row, centre_col) = map.centre();
        let resolution = map.resolution();
        let mut written = 0;
        for (index, cost) in costs.iter().enumerate() {
            if *cost == 0 {
                continue;
            }
            let (row, col) = (index / map.cols(), index % map.cols());
            let forward = (col as f32 - centre_col as f32 + 0.5) * resolution;
            let left = (centre_row as f32 - row as f32 + 0.5) * resolution;
            let world = pose.apply(Vec3::new(forward, left, 0.0));
            if let Some((mx, my)) = master.world_to_map(world.x, world.y) {
                master.raise(mx, my, *cost);
                written += 1;
            }
        }
        debug!(written, frame = %map.header().frame_id, "social layer stamped");
        written
    }
}
