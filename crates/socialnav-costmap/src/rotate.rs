//! Kernel rotation with bounding-box expansion.
//!
//! The output grid is grown to hold the whole rotated footprint, so nothing is
//! cropped, and kept odd-sized so the person still sits on a single centre
//! cell.  Rotation is counter-clockwise in map terms: +col is forward, −row is
//! left.  Resampling is bilinear with zero fill, which keeps every output
//! value inside the input's value range.

use std::f32::consts::TAU;

use socialnav_perception::person::wrap_angle;
use socialnav_types::Grid;

const ANGLE_EPSILON: f32 = 1e-6;

/// Rotate `kernel` by `angle` radians about its centre cell.
pub fn rotate_kernel(kernel: &Grid, angle: f32) -> Grid {
    let angle = wrap_angle(angle);
    if angle < ANGLE_EPSILON || TAU - angle < ANGLE_EPSILON {
        return kernel.clone();
    }

    let (rows, cols) = (kernel.rows() as f32, kernel.cols() as f32);
    let (sin, cos) = angle.sin_cos();
    let out_cols = odd_ceil(cols * cos.abs() + rows * sin.abs());
    let out_rows = odd_ceil(cols * sin.abs() + rows * cos.abs());

    let src_centre = ((rows - 1.0) / 2.0, (cols - 1.0) / 2.0);
    let dst_centre = ((out_rows - 1) as f32 / 2.0, (out_cols - 1) as f32 / 2.0);

    let mut out = Grid::zeros(out_rows, out_cols);
    for row in 0..out_rows {
        for col in 0..out_cols {
            let u = col as f32 - dst_centre.1;
            let v = dst_centre.0 - row as f32;
            // Inverse rotation back into the kernel's own frame.
            let su = u * cos + v * sin;
            let sv = -u * sin + v * cos;
            let value = bilinear(kernel, src_centre.0 - sv, src_centre.1 + su);
            if value > 0.0 {
                out.set(row, col, value);
            }
        }
    }
    out
}

fn odd_ceil(extent: f32) -> usize {
    let n = (extent - 1e-3).ceil().max(1.0) as usize;
    if n % 2 == 0 { n + 1 } else { n }
}

fn bilinear(grid: &Grid, row: f32, col: f32) -> f32 {
    if row <= -1.0 || col <= -1.0 || row >= grid.rows() as f32 || col >= grid.cols() as f32 {
        return 0.0;
    }
    let (r0, c0) = (row.floor(), col.floor());
    let (fr, fc) = (row - r0, col - c0);
    let sample = |r: f32, c: f32| -> f32 {
        if r < 0.0 || c < 0.0 {
            return 0.0;
        }
        grid.get(r as usize, c as usize).unwrap_or(0.0)
    };

    sample(r0, c0) * (1.0 - fr) * (1.0 - fc)
        + sample(r0, c0 + 1.0) * (1.0 - fr) * fc
        + sample(r0 + 1.0, c0) * fr * (1.0 - fc)
        + sample(r0 + 1.0, c0 + 1.0) * fr * fc
}
