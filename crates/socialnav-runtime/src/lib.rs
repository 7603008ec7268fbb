//! `socialnav-runtime` – the social map node and its process plumbing.
//!
//! # Modules
//!
//! - [`node`] – [`SocialMapNode`][node::SocialMapNode]: transform lookup,
//!   pose estimation, compositing and publishing, one detection batch at a
//!   time.
//! - [`config`] – [`SocialMapConfig`][config::SocialMapConfig]: TOML
//!   configuration at `~/.socialnav/config.toml` with `SOCIALNAV_*`
//!   environment overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.
//!   Set `OTEL_EXPORTER_OTLP_ENDPOINT` to export spans to any
//!   OTLP-compatible collector.

pub mod config;
pub mod node;
pub mod telemetry;

pub use config::{SocialMapConfig, TransformConfig};
pub use node::SocialMapNode;
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
