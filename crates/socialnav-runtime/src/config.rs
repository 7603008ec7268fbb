//! Configuration – reads/writes `~/.socialnav/config.toml`.
//!
//! Every field carries a serde default, so a partial (or empty) file is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use socialnav_costmap::{MapGeometry, ProxemicParams};
use socialnav_perception::{CameraModel, DepthSampling};
use socialnav_types::SocialError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Relative VFOV disagreement tolerated before warning about non-square pixels.
const ASPECT_TOLERANCE: f32 = 0.01;

/// Frame lookup settings of the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Frame the social map is centred on.
    #[serde(default = "default_robot_frame")]
    pub robot_frame: String,
    /// Upper bound on the transform wait per cycle (milliseconds).
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,
    /// Also undo the robot's yaw relative to the sensor, not just its offset.
    #[serde(default)]
    pub apply_rotation: bool,
}

fn default_robot_frame() -> String {
    "base_link".to_string()
}
fn default_wait_ms() -> u64 {
    10
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            robot_frame: default_robot_frame(),
            wait_ms: default_wait_ms(),
            apply_rotation: false,
        }
    }
}

/// Persisted node configuration stored in `~/.socialnav/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialMapConfig {
    #[serde(default)]
    pub map: MapGeometry,
    #[serde(default)]
    pub proxemics: ProxemicParams,
    #[serde(default)]
    pub camera: CameraModel,
    #[serde(default)]
    pub sampling: DepthSampling,
    #[serde(default)]
    pub transform: TransformConfig,
}

impl SocialMapConfig {
    /// Reject settings the node cannot run with.
    ///
    /// A vertical field of view that disagrees with the square-pixel
    /// assumption only produces a warning.
    pub fn validate(&self) -> Result<(), SocialError> {
        let map = &self.map;
        for (name, value) in [
            ("map.width_m", map.width_m),
            ("map.height_m", map.height_m),
            ("map.resolution_m", map.resolution_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SocialError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        if !(map.max_cost.is_finite() && map.max_cost >= 0.0) {
            return Err(SocialError::InvalidConfig(format!(
                "map.max_cost must be non-negative, got {}",
                map.max_cost
            )));
        }
        let (rows, cols) = map.dims();
        if rows == 0 || cols == 0 {
            return Err(SocialError::InvalidConfig(format!("map is empty ({rows}×{cols} cells)")));
        }

        self.proxemics.validate()?;

        let camera = &self.camera;
        if camera.resolution_x == 0 || camera.resolution_y == 0 {
            return Err(SocialError::InvalidConfig("camera resolution must be non-zero".to_string()));
        }
        if !(camera.hfov_deg > 0.0 && camera.hfov_deg < 180.0) {
            return Err(SocialError::InvalidConfig(format!(
                "camera.hfov_deg must lie in (0, 180), got {}",
                camera.hfov_deg
            )));
        }
        let mismatch = camera.aspect_mismatch();
        if !(mismatch <= ASPECT_TOLERANCE) {
            warn!(
                vfov_deg = camera.vfov_deg,
                implied_vfov_deg = camera.implied_vfov_deg(),
                "camera VFOV disagrees with square pixels; using HFOV only"
            );
        }

        if self.transform.robot_frame.is_empty() {
            return Err(SocialError::InvalidConfig("transform.robot_frame must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Return the path to `~/.socialnav/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".socialnav").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<SocialMapConfig>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path and apply environment overrides.
pub fn load_from(path: &Path) -> Result<Option<SocialMapConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: SocialMapConfig = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SOCIALNAV_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SOCIALNAV_MAX_COST` | `map.max_cost` |
/// | `SOCIALNAV_RESOLUTION` | `map.resolution_m` |
/// | `SOCIALNAV_ROBOT_FRAME` | `transform.robot_frame` |
/// | `SOCIALNAV_TF_WAIT_MS` | `transform.wait_ms` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut SocialMapConfig) {
    if let Ok(v) = std::env::var("SOCIALNAV_MAX_COST")
        && let Ok(cost) = v.parse::<f32>()
    {
        cfg.map.max_cost = cost;
    }
    if let Ok(v) = std::env::var("SOCIALNAV_RESOLUTION")
        && let Ok(resolution) = v.parse::<f32>()
    {
        cfg.map.resolution_m = resolution;
    }
    if let Ok(v) = std::env::var("SOCIALNAV_ROBOT_FRAME") {
        cfg.transform.robot_frame = v;
    }
    if let Ok(v) = std::env::var("SOCIALNAV_TF_WAIT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.transform.wait_ms = ms;
    }
}

/// Save the config to disk, creating `~/.socialnav/` if necessary.
pub fn save(cfg: &SocialMapConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub fn save_to(cfg: &SocialMapConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_values() {
        let cfg = SocialMapConfig::default();
        assert_eq!(cfg.map.dims(), (300, 300));
        assert_eq!(cfg.map.max_cost, 100.0);
        assert_eq!(cfg.camera.resolution_x, 640);
        assert_eq!(cfg.sampling.orientation_radius, 2);
        assert_eq!(cfg.sampling.position_radius, 1);
        assert_eq!(cfg.transform.robot_frame, "base_link");
        assert_eq!(cfg.transform.wait_ms, 10);
        assert!(!cfg.transform.apply_rotation);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = SocialMapConfig::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.proxemics, cfg.proxemics);
        assert_eq!(loaded.camera, cfg.camera);
        assert_eq!(loaded.sampling, cfg.sampling);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[map]\nwidth_m = 10.0\n\n[proxemics]\nspeed_buckets = [0.0, 1.0]\n").expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.map.width_m, 10.0);
        assert_eq!(cfg.map.height_m, 15.0);
        assert_eq!(cfg.proxemics.speed_buckets, vec![0.0, 1.0]);
        assert_eq!(cfg.proxemics.sigma_front, 2.0);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[map\nwidth_m = ").expect("write");
        let err = load_from(&path).expect_err("must fail");
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_socialnav_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".socialnav"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = SocialMapConfig::default();
        cfg.map.resolution_m = 0.0;
        assert!(matches!(cfg.validate(), Err(SocialError::InvalidConfig(_))));

        let mut cfg = SocialMapConfig::default();
        cfg.proxemics.sigma_side = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = SocialMapConfig::default();
        cfg.camera.hfov_deg = 180.0;
        assert!(cfg.validate().is_err());

        let mut cfg = SocialMapConfig::default();
        cfg.transform.robot_frame.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn vfov_mismatch_only_warns() {
        let mut cfg = SocialMapConfig::default();
        cfg.camera.vfov_deg = 60.0;
        assert!(cfg.validate().is_ok());
    }

    // All environment overrides live in one test: the variables are process
    // wide and tests run in parallel.
    #[test]
    fn apply_env_overrides_changes_fields() {
        // SAFETY: no other test reads or writes these variables.
        unsafe {
            std::env::set_var("SOCIALNAV_MAX_COST", "254");
            std::env::set_var("SOCIALNAV_RESOLUTION", "0.1");
            std::env::set_var("SOCIALNAV_ROBOT_FRAME", "odom");
            std::env::set_var("SOCIALNAV_TF_WAIT_MS", "not-a-number");
        }
        let mut cfg = SocialMapConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.map.max_cost, 254.0);
        assert_eq!(cfg.map.resolution_m, 0.1);
        assert_eq!(cfg.transform.robot_frame, "odom");
        assert_eq!(cfg.transform.wait_ms, 10, "unparsable value is ignored");
        unsafe {
            std::env::remove_var("SOCIALNAV_MAX_COST");
            std::env::remove_var("SOCIALNAV_RESOLUTION");
            std::env::remove_var("SOCIALNAV_ROBOT_FRAME");
            std::env::remove_var("SOCIALNAV_TF_WAIT_MS");
        }
    }
}
