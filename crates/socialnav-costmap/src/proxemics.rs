//! Proxemic zone kernels.
//!
//! A [`ProxemicZone`] is a square cost kernel centred on a person facing +x
//! (the map's column direction).  The cost falls off as an asymmetric
//! Gaussian: wide in front, narrow behind, with its own spread to the sides.
//!
//! ```text
//! g(u, v) = exp(−(u²/(2σ_u²) + v²/(2σ_side²)))
//! σ_u     = σ_front(speed)   if u ≥ 0
//!           σ_back           otherwise
//! σ_front(speed) = σ_front + front_sigma_per_speed · speed
//! cost    = min(max_cost, max_cost · g)       (0 beyond the support radius)
//! ```
//!
//! [`ProxemicZoneModel`] precomputes one kernel per speed bucket at start-up;
//! kernels are never modified afterwards.

use serde::{Deserialize, Serialize};
use socialnav_types::{Grid, SocialError};
use tracing::debug;

/// Shape of the proxemic kernels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxemicParams {
    /// Spread in front of the person (metres).
    #[serde(default = "default_sigma_front")]
    pub sigma_front: f32,
    /// Spread to either side (metres).
    #[serde(default = "default_sigma_side")]
    pub sigma_side: f32,
    /// Spread behind the person (metres).
    #[serde(default = "default_sigma_back")]
    pub sigma_back: f32,
    /// Kernel radius (metres); cells further out are zero.
    #[serde(default = "default_support_radius_m")]
    pub support_radius_m: f32,
    /// Sub-samples per cell and axis when discretising the Gaussian.
    #[serde(default = "default_discretization")]
    pub discretization: u32,
    /// Speeds (m/s) for which a kernel is precomputed.
    #[serde(default = "default_speed_buckets")]
    pub speed_buckets: Vec<f32>,
    /// Growth of the front spread per m/s of walking speed.
    #[serde(default = "default_front_sigma_per_speed")]
    pub front_sigma_per_speed: f32,
}

fn default_sigma_front() -> f32 {
    2.0
}
fn default_sigma_side() -> f32 {
    4.0 / 3.0
}
fn default_sigma_back() -> f32 {
    1.0
}
fn default_support_radius_m() -> f32 {
    4.0
}
fn default_discretization() -> u32 {
    2
}
fn default_speed_buckets() -> Vec<f32> {
    vec![0.0]
}
fn default_front_sigma_per_speed() -> f32 {
    1.0
}

impl Default for ProxemicParams {
    fn default() -> Self {
        Self {
            sigma_front: default_sigma_front(),
            sigma_side: default_sigma_side(),
            sigma_back: default_sigma_back(),
            support_radius_m: default_support_radius_m(),
            discretization: default_discretization(),
            speed_buckets: default_speed_buckets(),
            front_sigma_per_speed: default_front_sigma_per_speed(),
        }
    }
}

impl ProxemicParams {
    /// Reject parameters that would produce an empty or degenerate kernel.
    pub fn validate(&self) -> Result<(), SocialError> {
        let positive = [
            ("sigma_front", self.sigma_front),
            ("sigma_side", self.sigma_side),
            ("sigma_back", self.sigma_back),
            ("support_radius_m", self.support_radius_m),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SocialError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        if self.discretization == 0 {
            return Err(SocialError::InvalidConfig("discretization must be at least 1".to_string()));
        }
        if !(self.front_sigma_per_speed.is_finite() && self.front_sigma_per_speed >= 0.0) {
            return Err(SocialError::InvalidConfig(
                "front_sigma_per_speed must be non-negative".to_string(),
            ));
        }
        if self.speed_buckets.is_empty() {
            return Err(SocialError::InvalidConfig("at least one speed bucket is required".to_string()));
        }
        if let Some(bad) = self.speed_buckets.iter().find(|s| !(s.is_finite() && **s >= 0.0)) {
            return Err(SocialError::InvalidConfig(format!("invalid speed bucket {bad}")));
        }
        Ok(())
    }

    pub fn sigma_front_at(&self, speed: f32) -> f32 {
        self.sigma_front + self.front_sigma_per_speed * speed.max(0.0)
    }
}

/// Unnormalised asymmetric Gaussian at offset `(u, v)`: `u` along the facing
/// direction, `v` to the left.  Equals 1 at the origin.
pub fn asymmetric_gaussian(u: f32, v: f32, sigma_front: f32, sigma_back: f32, sigma_side: f32) -> f32 {
    let sigma_u = if u >= 0.0 { sigma_front } else { sigma_back };
    (-(u * u / (2.0 * sigma_u * sigma_u) + v * v / (2.0 * sigma_side * sigma_side))).exp()
}

// ────────────────────────────────────────────────────────────────────────────
// ProxemicZone
// ────────────────────────────────────────────────────────────────────────────

/// Immutable cost kernel for one speed bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxemicZone {
    speed: f32,
    kernel: Grid,
}

impl ProxemicZone {
    /// Wrap a hand-made kernel.  The person sits at the kernel's centre cell.
    pub fn from_grid(speed: f32, kernel: Grid) -> Self {
        Self { speed, kernel }
    }

    fn build(params: &ProxemicParams, speed: f32, resolution: f32, max_cost: f32) -> Self {
        // Tolerate float noise so that e.g. 4.0 / 0.05 stays at 80 cells.
        let half = (params.support_radius_m / resolution - 1e-3).ceil().max(0.0) as usize;
        let side = 2 * half + 1;
        let sigma_front = params.sigma_front_at(speed);
        let k = params.discretization.max(1);
        let offsets: Vec<f32> = (0..k)
            .map(|i| ((i as f32 + 0.5) / k as f32 - 0.5) * resolution)
            .collect();
        let samples = (k * k) as f32;

        let mut kernel = Grid::zeros(side, side);
        for row in 0..side {
            for col in 0..side {
                let u = (col as f32 - half as f32) * resolution;
                let v = (half as f32 - row as f32) * resolution;
                if u.hypot(v) > params.support_radius_m {
                    continue;
                }
                let mut sum = 0.0;
                for du in &offsets {
                    for dv in &offsets {
                        sum += asymmetric_gaussian(u + du, v + dv, sigma_front, params.sigma_back, params.sigma_side);
                    }
                }
                kernel.set(row, col, (max_cost * sum / samples).min(max_cost));
            }
        }
        Self { speed, kernel }
    }

    /// Lower bound of the speed bucket this kernel serves (m/s).
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn kernel(&self) -> &Grid {
        &self.kernel
    }

    pub fn peak(&self) -> f32 {
        self.kernel.max_value()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ProxemicZoneModel
// ────────────────────────────────────────────────────────────────────────────

/// The full set of precomputed kernels, sorted by speed.
#[derive(Debug, Clone)]
pub struct ProxemicZoneModel {
    zones: Vec<ProxemicZone>,
}

impl ProxemicZoneModel {
    /// Precompute one kernel per speed bucket for maps of the given
    /// `resolution` (metres per cell).
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::InvalidConfig`] for invalid parameters or a
    /// non-positive resolution.
    pub fn new(params: &ProxemicParams, resolution: f32, max_cost: f32) -> Result<Self, SocialError> {
        params.validate()?;
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(SocialError::InvalidConfig(format!("resolution must be positive, got {resolution}")));
        }
        if !(max_cost.is_finite() && max_cost >= 0.0) {
            return Err(SocialError::InvalidConfig(format!("max_cost must be non-negative, got {max_cost}")));
        }

        let zones = params
            .speed_buckets
            .iter()
            .map(|speed| ProxemicZone::build(params, *speed, resolution, max_cost))
            .collect();
        let model = Self::from_zones(zones)?;
        debug!(
            buckets = model.zones.len(),
            side = model.zones[0].kernel.cols(),
            "proxemic kernels built"
        );
        Ok(model)
    }

    /// Assemble a model from ready-made zones.
    pub fn from_zones(mut zones: Vec<ProxemicZone>) -> Result<Self, SocialError> {
        if zones.is_empty() {
            return Err(SocialError::InvalidConfig("at least one proxemic zone is required".to_string()));
        }
        zones.sort_by(|a, b| a.speed.total_cmp(&b.speed));
        Ok(Self { zones })
    }

    /// Kernel of the fastest bucket not exceeding `speed`; the slowest bucket
    /// for anything below it.
    pub fn zone_for_speed(&self, speed: f32) -> &ProxemicZone {
        self.zones
            .iter()
            .rev()
            .find(|z| z.speed <= speed)
            .unwrap_or(&self.zones[0])
    }

    pub fn zones(&self) -> &[ProxemicZone] {
        &self.zones
    }
}
