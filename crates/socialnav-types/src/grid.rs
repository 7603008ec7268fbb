//! Dense 2-D cost grids.
//!
//! [`Grid`] is the plain row-major `f32` buffer shared by proxemic kernels and
//! maps; [`CostMap`] adds the physical metadata (resolution, frame, stamp)
//! and the `[0, max_cost]` clamp that consumers rely on.

use serde::{Deserialize, Serialize};

use crate::FrameHeader;

// ────────────────────────────────────────────────────────────────────────────
// Grid
// ────────────────────────────────────────────────────────────────────────────

/// Row-major 2-D array of `f32` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<f32>,
}

impl Grid {
    /// A zero-filled grid.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0.0; rows * cols],
        }
    }

    /// Wrap an existing buffer.  Returns `None` if `cells.len() != rows * cols`.
    pub fn from_cells(rows: usize, cols: usize, cells: Vec<f32>) -> Option<Self> {
        (cells.len() == rows * cols).then_some(Self { rows, cols, cells })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.cells[row * self.cols + col])
        } else {
            None
        }
    }

    /// Write one cell.  Out-of-range writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col] = value;
        }
    }

    /// Largest cell value (`0.0` for an empty grid).
    pub fn max_value(&self) -> f32 {
        self.cells.iter().copied().fold(0.0, f32::max)
    }

    /// Elementwise maximum of a `rows × cols` window of `src` (starting at
    /// `src_origin`) into the window of `self` starting at `dst_origin`.
    ///
    /// The window is shrunk to whatever part of it lies inside both grids, so
    /// callers may pass an unclipped window without risking out-of-range
    /// access.
    pub fn merge_max(
        &mut self,
        dst_origin: (usize, usize),
        src: &Grid,
        src_origin: (usize, usize),
        rows: usize,
        cols: usize,
    ) {
        self.merge_max_with(dst_origin, src, src_origin, rows, cols, |s| s);
    }

    /// [`Grid::merge_max`] with every source value passed through `map` first.
    fn merge_max_with(
        &mut self,
        dst_origin: (usize, usize),
        src: &Grid,
        src_origin: (usize, usize),
        rows: usize,
        cols: usize,
        map: impl Fn(f32) -> f32,
    ) {
        let rows = rows
            .min(self.rows.saturating_sub(dst_origin.0))
            .min(src.rows.saturating_sub(src_origin.0));
        let cols = cols
            .min(self.cols.saturating_sub(dst_origin.1))
            .min(src.cols.saturating_sub(src_origin.1));

        for r in 0..rows {
            let dst_start = (dst_origin.0 + r) * self.cols + dst_origin.1;
            let src_start = (src_origin.0 + r) * src.cols + src_origin.1;
            let dst_row = &mut self.cells[dst_start..dst_start + cols];
            let src_row = &src.cells[src_start..src_start + cols];
            for (d, s) in dst_row.iter_mut().zip(src_row) {
                *d = d.max(map(*s));
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CostMap
// ────────────────────────────────────────────────────────────────────────────

/// Egocentric social cost grid produced once per update cycle.
///
/// Row 0 is the far-left edge of the map (rows grow towards the robot's
/// right); column 0 is the rear edge (columns grow forward).  The robot sits
/// at [`CostMap::centre`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMap {
    grid: Grid,
    /// Metres per cell.
    resolution: f32,
    max_cost: f32,
    header: FrameHeader,
}

impl CostMap {
    /// A zero-filled map.
    pub fn new(rows: usize, cols: usize, resolution: f32, max_cost: f32, header: FrameHeader) -> Self {
        Self {
            grid: Grid::zeros(rows, cols),
            resolution,
            max_cost: max_cost.max(0.0),
            header,
        }
    }

    pub fn rows(&self) -> usize {
        self.grid.rows()
    }

    pub fn cols(&self) -> usize {
        self.grid.cols()
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    pub fn max_cost(&self) -> f32 {
        self.max_cost
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.grid.get(row, col)
    }

    /// Cell holding the robot: half the grid dimensions.
    pub fn centre(&self) -> (usize, usize) {
        (self.rows() / 2, self.cols() / 2)
    }

    /// Max-combine a window of `src` into the map (see [`Grid::merge_max`]).
    ///
    /// Merged values are clamped to `[0, max_cost]`.
    pub fn merge_max(
        &mut self,
        dst_origin: (usize, usize),
        src: &Grid,
        src_origin: (usize, usize),
        rows: usize,
        cols: usize,
    ) {
        let max_cost = self.max_cost;
        self.grid
            .merge_max_with(dst_origin, src, src_origin, rows, cols, |s| s.clamp(0.0, max_cost));
    }

    /// Row-major `u8` copy of the map, saturating like an 8-bit image
    /// conversion.
    pub fn to_u8(&self) -> Vec<u8> {
        self.grid
            .cells()
            .iter()
            .map(|c| c.round().clamp(0.0, 255.0) as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn header() -> FrameHeader {
        FrameHeader::new("base_link", Utc::now())
    }

    #[test]
    fn from_cells_checks_length() {
        assert!(Grid::from_cells(2, 2, vec![0.0; 4]).is_some());
        assert!(Grid::from_cells(2, 2, vec![0.0; 3]).is_none());
    }

    #[test]
    fn merge_max_takes_larger_value() {
        let mut dst = Grid::from_cells(1, 3, vec![0.2, 0.9, 0.0]).unwrap();
        let src = Grid::from_cells(1, 3, vec![0.5, 0.5, 0.5]).unwrap();
        dst.merge_max((0, 0), &src, (0, 0), 1, 3);
        assert_eq!(dst.cells(), &[0.5, 0.9, 0.5]);
    }

    #[test]
    fn merge_max_clips_oversized_window() {
        let mut dst = Grid::zeros(3, 3);
        let src = Grid::from_cells(2, 2, vec![1.0; 4]).unwrap();
        // Window larger than both grids and anchored at the bottom-right corner.
        dst.merge_max((2, 2), &src, (0, 0), 10, 10);
        assert_eq!(dst.get(2, 2), Some(1.0));
        assert_eq!(dst.max_value(), 1.0);
        assert_eq!(dst.cells().iter().filter(|c| **c > 0.0).count(), 1);
    }

    #[test]
    fn cost_map_clamps_to_max_cost() {
        let mut map = CostMap::new(2, 2, 0.05, 1.0, header());
        let src = Grid::from_cells(2, 2, vec![5.0, 0.5, -1.0, 1.0]).unwrap();
        map.merge_max((0, 0), &src, (0, 0), 2, 2);
        assert_eq!(map.grid().cells(), &[1.0, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn cost_map_merge_touches_only_its_window() {
        let mut map = CostMap::new(4, 4, 0.05, 10.0, header());
        let hot = Grid::from_cells(1, 1, vec![50.0]).unwrap();
        map.merge_max((0, 0), &hot, (0, 0), 1, 1);
        let patch = Grid::from_cells(2, 2, vec![3.0, 20.0, -4.0, 7.0]).unwrap();
        map.merge_max((2, 2), &patch, (0, 0), 2, 2);

        assert_eq!(map.get(0, 0), Some(10.0));
        assert_eq!(map.get(2, 2), Some(3.0));
        assert_eq!(map.get(2, 3), Some(10.0));
        assert_eq!(map.get(3, 2), Some(0.0));
        assert_eq!(map.get(3, 3), Some(7.0));
        assert_eq!(map.grid().cells().iter().filter(|c| **c > 0.0).count(), 4);
    }

    #[test]
    fn cost_map_centre_is_half_dimensions() {
        let map = CostMap::new(300, 200, 0.05, 100.0, header());
        assert_eq!(map.centre(), (150, 100));
    }

    #[test]
    fn to_u8_saturates() {
        let mut map = CostMap::new(1, 3, 0.05, 400.0, header());
        let src = Grid::from_cells(1, 3, vec![300.0, 99.6, 0.0]).unwrap();
        map.merge_max((0, 0), &src, (0, 0), 1, 3);
        assert_eq!(map.to_u8(), vec![255, 100, 0]);
    }
}
