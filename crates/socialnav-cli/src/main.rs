//! `socialnav` – replay a recorded scene through the social map node.
//!
//! ```text
//! socialnav <scene.json> [out_dir]
//! ```
//!
//! 1. Initialises tracing (`RUST_LOG`, `SOCIALNAV_LOG_FORMAT`,
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`).
//! 2. Loads `~/.socialnav/config.toml`, falling back to defaults.
//! 3. Publishes every scene frame on the `Detections` topic, feeds the
//!    frame's robot pose into a transform buffer and waits for the node's
//!    social map.
//! 4. Writes each map as `frame_NNNN.pgm` (plus `global.pgm` when the scene
//!    asks for a global grid) and prints a summary.

mod pgm;
mod scene;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use colored::Colorize;
use socialnav_costmap::SocialLayer;
use socialnav_middleware::{EventBus, Payload, Topic, TopicReceiver};
use socialnav_perception::TfBuffer;
use socialnav_runtime::{SocialMapConfig, SocialMapNode, config, init_tracing};
use socialnav_types::CostMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::scene::Scene;

/// Slack on top of the node's transform wait before a frame counts as
/// dropped.
const MAP_GRACE: Duration = Duration::from_millis(500);
const SOURCE: &str = "socialnav::cli";

fn main() -> ExitCode {
    let _guard = init_tracing("socialnav");
    print_banner();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(scene_path) = args.first().map(PathBuf::from) else {
        println!("  Usage: {} <scene.json> [out_dir]", "socialnav".bold());
        return ExitCode::FAILURE;
    };
    let out_dir = args.get(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("social_maps"));

    let cfg = resolve_config(config::load());

    let scene = match scene::load(&scene_path) {
        Ok(scene) => scene,
        Err(e) => {
            println!("{}: {}", "Scene error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Runtime error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(replay(&cfg, scene, &out_dir)) {
        Ok(summary) => {
            print_summary(&summary, &out_dir);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Replay failed".red(), e);
            ExitCode::FAILURE
        }
    }
}

/// Pick the loaded config, or defaults with `SOCIALNAV_*` overrides when the
/// file is missing or unreadable.
fn resolve_config(loaded: Result<Option<SocialMapConfig>, String>) -> SocialMapConfig {
    let mut cfg = match loaded {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config::config_path().display().to_string().bold());
            return cfg;
        }
        Ok(None) => {
            println!("  No config at {}; using defaults.", config::config_path().display().to_string().dimmed());
            SocialMapConfig::default()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            SocialMapConfig::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Replay
// ─────────────────────────────────────────────────────────────────────────────

/// One line of the final report.
#[derive(Debug, Clone, PartialEq)]
struct FrameReport {
    index: usize,
    persons: usize,
    /// `None` when the node produced no map for the frame.
    peak: Option<f32>,
    occupied_cells: usize,
}

#[derive(Debug, Default)]
struct ReplaySummary {
    frames: Vec<FrameReport>,
    global_written: bool,
}

impl ReplaySummary {
    fn maps_written(&self) -> usize {
        self.frames.iter().filter(|f| f.peak.is_some()).count()
    }
}

async fn replay(cfg: &SocialMapConfig, scene: Scene, out_dir: &Path) -> Result<ReplaySummary, String> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| format!("Failed to create output directory {}: {}", out_dir.display(), e))?;

    let bus = EventBus::default();
    let transforms = Arc::new(TfBuffer::new());
    let mut node = SocialMapNode::new(cfg, transforms.clone(), bus.clone()).map_err(|e| e.to_string())?;

    let detections = bus.subscribe_to(Topic::Detections);
    let mut maps = bus.subscribe_to(Topic::SocialMap);
    let (stop, shutdown) = watch::channel(false);
    let node_task = tokio::spawn(async move { node.run(detections, shutdown).await });

    let mut layer = SocialLayer::new(scene.global_map.is_some());
    let mut global = scene.global_map.as_ref().map(|spec| spec.grid());
    let wait = Duration::from_millis(cfg.transform.wait_ms) + MAP_GRACE;
    let mut summary = ReplaySummary::default();

    for (index, frame) in scene.frames.iter().enumerate() {
        if let Some(robot) = frame.robot {
            transforms
                .set_transform(&frame.frame_id, &cfg.transform.robot_frame, robot.transform(), frame.stamp)
                .await;
        }
        let batch = frame.to_batch().map_err(|e| format!("frame {index}: {e}"))?;
        bus.publish(SOURCE, Payload::Detections(Arc::new(batch)))
            .map_err(|e| e.to_string())?;

        let mut report = FrameReport {
            index,
            persons: frame.persons.len(),
            peak: None,
            occupied_cells: 0,
        };
        match await_map(&mut maps, frame.stamp, wait).await? {
            Some(map) => {
                let path = out_dir.join(format!("frame_{index:04}.pgm"));
                pgm::write(&path, map.cols(), map.rows(), &map.to_u8())
                    .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
                report.peak = Some(map.grid().max_value());
                report.occupied_cells = map.grid().cells().iter().filter(|c| **c > 0.0).count();

                if let (Some(grid), Some(pose)) = (global.as_mut(), frame.world_pose) {
                    layer.receive(Arc::clone(&map), pose.transform());
                    layer.update_costs(grid);
                }
                info!(index, path = %path.display(), "social map written");
            }
            None => warn!(index, "no social map for frame"),
        }
        summary.frames.push(report);
    }

    // The node may already be gone; only its result matters.
    let _ = stop.send(true);
    node_task.await.map_err(|e| format!("node task failed: {e}"))?;

    if let Some(grid) = &global {
        let path = out_dir.join("global.pgm");
        pgm::write(&path, grid.size_x(), grid.size_y(), grid.cells())
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        summary.global_written = true;
    }
    Ok(summary)
}

/// Wait up to `wait` for the map built from the frame stamped `stamp`.
/// Maps left over from earlier frames are dropped.
async fn await_map(
    maps: &mut TopicReceiver,
    stamp: DateTime<Utc>,
    wait: Duration,
) -> Result<Option<Arc<CostMap>>, String> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let message = match tokio::time::timeout_at(deadline, maps.recv()).await {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => return Err(format!("social map topic failed: {e}")),
            Err(_) => return Ok(None),
        };
        match message.payload {
            Payload::SocialMap(map) if map.header().stamp == stamp => return Ok(Some(map)),
            Payload::SocialMap(map) => debug!(stale = %map.header().stamp, %stamp, "late social map dropped"),
            Payload::Detections(_) => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(summary: &ReplaySummary, out_dir: &Path) {
    println!();
    println!("  {:>5}  {:>7}  {:>8}  {:>9}", "frame", "persons", "peak", "occupied");
    for f in &summary.frames {
        match f.peak {
            Some(peak) => println!(
                "  {:>5}  {:>7}  {:>8.1}  {:>9}",
                f.index,
                f.persons,
                peak,
                f.occupied_cells
            ),
            None => println!(
                "  {:>5}  {:>7}  {}",
                f.index,
                f.persons,
                "no map (transform unavailable)".yellow()
            ),
        }
    }
    println!();
    println!(
        "  {} {} of {} frame(s) written to {}",
        "✓".green().bold(),
        summary.maps_written(),
        summary.frames.len(),
        out_dir.display().to_string().bold()
    );
    if summary.global_written {
        println!("  {} global grid written to {}", "✓".green().bold(), "global.pgm".bold());
    }
}

fn print_banner() {
    println!();
    println!("  {} {}", "SocialNav".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Proxemic cost maps from body keypoints");
    println!();
}
