//! Transform Frame (TF) Engine.
//!
//! Maintains a graph of named reference frames and the 3-D rigid-body
//! transforms (translation + quaternion rotation) that relate them.  Given any
//! two frame names the engine composes a chain of transforms via BFS, walking
//! edges backwards through their inverse when needed.
//!
//! Edges are either static (mounting offsets) or stamped (odometry-like
//! updates).  A time-qualified lookup only uses stamped edges that have caught
//! up with the requested time; [`TfBuffer`] wraps the engine for async callers
//! that want to wait for that to happen.
//!
//! # Example
//!
//! ```rust
//! use socialnav_perception::transform::{TfEngine, Transform3D, Vec3, Quaternion};
//!
//! let mut tf = TfEngine::new();
//!
//! // base_link is 1 m forward of odom, same orientation.
//! tf.set_static("odom", "base_link",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//!
//! // camera_link is 0.5 m forward of base_link.
//! tf.set_static("base_link", "camera_link",
//!     Transform3D::new(Vec3::new(0.5, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("odom", "camera_link").unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-5);
//!
//! // Walking the chain backwards inverts it.
//! let back = tf.lookup("camera_link", "odom").unwrap();
//! assert!((back.translation.x + 1.5).abs() < 1e-5);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tracing::trace;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (metres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw` radians about +Z.
    pub fn from_yaw(yaw: f32) -> Self {
        let half = 0.5 * yaw;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Heading about +Z, in (−π, π].
    pub fn yaw(self) -> f32 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body 3-D transform: the pose of frame B expressed in frame A.
///
/// To convert a point expressed in frame B into frame A, rotate it by
/// `rotation` then add `translation` (see [`Transform3D::apply`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Planar pose: translation `(x, y)` and heading `yaw`.
    pub fn planar(x: f32, y: f32, yaw: f32) -> Self {
        Self::new(Vec3::new(x, y, 0.0), Quaternion::from_yaw(yaw))
    }

    /// Compose two transforms: if `self` = T_A_B and `other` = T_B_C, the
    /// result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// T_B_A from T_A_B.
    pub fn inverse(self) -> Self {
        let rotation = self.rotation.conjugate();
        Self::new(rotation.rotate(self.translation).neg(), rotation)
    }

    /// Map a point from frame B into frame A.
    pub fn apply(self, p: Vec3) -> Vec3 {
        self.translation.add(self.rotation.rotate(p))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Edge {
    transform: Transform3D,
    /// `None` for static edges.
    stamp: Option<DateTime<Utc>>,
}

impl Edge {
    fn usable_at(&self, stamp: Option<DateTime<Utc>>) -> bool {
        match (self.stamp, stamp) {
            (Some(edge), Some(requested)) => edge >= requested,
            _ => true,
        }
    }
}

/// A graph of named reference frames and the [`Transform3D`]s that relate
/// them.
///
/// Frames are identified by arbitrary string names (e.g. `"odom"`,
/// `"base_link"`, `"camera_link"`).  Each edge `parent → child` stores the
/// pose of the child in the parent; lookups may traverse it in either
/// direction.
#[derive(Debug, Default)]
pub struct TfEngine {
    /// `edges[parent][child]`
    edges: HashMap<String, HashMap<String, Edge>>,
    /// `reverse[child][parent]`, same edges indexed the other way round.
    reverse: HashMap<String, HashMap<String, Edge>>,
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a time-independent edge.
    pub fn set_static(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.insert(parent_frame, child_frame, Edge { transform, stamp: None });
    }

    /// Register or update an edge valid from `stamp` on.
    pub fn set_transform(
        &mut self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: DateTime<Utc>,
    ) {
        self.insert(
            parent_frame,
            child_frame,
            Edge {
                transform,
                stamp: Some(stamp),
            },
        );
    }

    fn insert(&mut self, parent_frame: &str, child_frame: &str, edge: Edge) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), edge);
        self.reverse
            .entry(child_frame.to_string())
            .or_default()
            .insert(parent_frame.to_string(), edge);
    }

    /// Whether any edge mentions `frame`.
    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame) || self.reverse.contains_key(frame)
    }

    /// Pose of `frame` expressed in `reference`, using the newest data of
    /// every edge.  Returns `None` if the frames are not connected.
    pub fn lookup(&self, reference: &str, frame: &str) -> Option<Transform3D> {
        self.search(reference, frame, None)
    }

    /// Like [`TfEngine::lookup`], but stamped edges older than `stamp` are
    /// treated as not yet available.
    pub fn lookup_at(&self, reference: &str, frame: &str, stamp: DateTime<Utc>) -> Option<Transform3D> {
        self.search(reference, frame, Some(stamp))
    }

    fn search(&self, reference: &str, frame: &str, stamp: Option<DateTime<Utc>>) -> Option<Transform3D> {
        if reference == frame {
            return Some(Transform3D::identity());
        }

        // BFS; each queue item carries the pose of the current node in
        // `reference`.
        let mut queue: VecDeque<(&str, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();

        queue.push_back((reference, Transform3D::identity()));
        visited.insert(reference);

        while let Some((current, accumulated)) = queue.pop_front() {
            let forward = self
                .edges
                .get(current)
                .into_iter()
                .flatten()
                .map(|(next, edge)| (next, edge, edge.transform));
            let backward = self
                .reverse
                .get(current)
                .into_iter()
                .flatten()
                .map(|(next, edge)| (next, edge, edge.transform.inverse()));

            for (next, edge, step) in forward.chain(backward) {
                if visited.contains(next.as_str()) || !edge.usable_at(stamp) {
                    continue;
                }
                let composed = accumulated.compose(step);
                if next == frame {
                    return Some(composed);
                }
                visited.insert(next.as_str());
                queue.push_back((next.as_str(), composed));
            }
        }

        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Async lookup
// ────────────────────────────────────────────────────────────────────────────

/// Errors reported by a [`TransformSource`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("no transform from {frame} to {reference}")]
    NoPath { reference: String, frame: String },
}

/// Anything able to resolve the pose of one frame in another at a point in
/// time.
///
/// Implementations may wait for data to arrive; callers bound that wait with
/// their own timeout.
#[async_trait]
pub trait TransformSource: Send + Sync {
    async fn lookup_transform(
        &self,
        reference: &str,
        frame: &str,
        stamp: DateTime<Utc>,
    ) -> Result<Transform3D, TransformError>;
}

/// Shared, updatable [`TfEngine`] whose lookups wait for late edges.
#[derive(Debug, Default)]
pub struct TfBuffer {
    engine: RwLock<TfEngine>,
    updated: Notify,
}

impl TfBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_static(&self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.engine
            .write()
            .await
            .set_static(parent_frame, child_frame, transform);
        self.updated.notify_waiters();
    }

    pub async fn set_transform(
        &self,
        parent_frame: &str,
        child_frame: &str,
        transform: Transform3D,
        stamp: DateTime<Utc>,
    ) {
        self.engine
            .write()
            .await
            .set_transform(parent_frame, child_frame, transform, stamp);
        self.updated.notify_waiters();
    }
}

#[async_trait]
impl TransformSource for TfBuffer {
    /// Waits until every edge on a path is at least as new as `stamp`; wrap
    /// it in a timeout.
    ///
    /// Fails with [`TransformError::NoPath`] straight away when both frames
    /// are known but lie in separate trees.  While either frame is still
    /// unknown the lookup keeps waiting.
    async fn lookup_transform(
        &self,
        reference: &str,
        frame: &str,
        stamp: DateTime<Utc>,
    ) -> Result<Transform3D, TransformError> {
        loop {
            // Register for wake-ups before checking so an update landing in
            // between is not missed.
            let notified = self.updated.notified();
            {
                let engine = self.engine.read().await;
                if let Some(t) = engine.lookup_at(reference, frame, stamp) {
                    return Ok(t);
                }
                let disconnected =
                    engine.has_frame(reference) && engine.has_frame(frame) && engine.lookup(reference, frame).is_none();
                if disconnected {
                    return Err(TransformError::NoPath {
                        reference: reference.to_string(),
                        frame: frame.to_string(),
                    });
                }
            }
            trace!(reference, frame, %stamp, "waiting for transform");
            notified.await;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::f32::consts::{FRAC_1_SQRT_2, FRAC_PI_2};
    use std::sync::Arc;
    use std::time::Duration;

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-5, "x should be ~0, got {}", r.x);
        assert!((r.y - 1.0).abs() < 1e-5, "y should be ~1, got {}", r.y);
        assert!(r.z.abs() < 1e-5);
    }

    #[test]
    fn from_yaw_and_yaw_agree() {
        for yaw in [-3.0_f32, -FRAC_PI_2, 0.0, 0.4, FRAC_PI_2, 3.0] {
            let q = Quaternion::from_yaw(yaw);
            assert!((q.yaw() - yaw).abs() < 1e-5, "yaw {yaw} came back as {}", q.yaw());
        }
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn transform_compose_translations_add() {
        let t1 = Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity());
        let t2 = Transform3D::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::identity());
        let composed = t1.compose(t2);
        assert!((composed.translation.x - 3.0).abs() < 1e-5);
    }

    #[test]
    fn inverse_undoes_transform() {
        let t = Transform3D::planar(2.0, -1.0, 0.7);
        let p = Vec3::new(0.3, 0.4, 0.5);
        let back = t.inverse().apply(t.apply(p));
        assert!((back.x - p.x).abs() < 1e-5);
        assert!((back.y - p.y).abs() < 1e-5);
        assert!((back.z - p.z).abs() < 1e-5);
    }

    // ── TfEngine ────────────────────────────────────────────────────────────

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfEngine::new();
        assert_eq!(tf.lookup("odom", "odom"), Some(Transform3D::identity()));
    }

    #[test]
    fn lookup_composed_chain() {
        let mut tf = TfEngine::new();
        tf.set_static("odom", "base_link", Transform3D::planar(1.0, 0.0, 0.0));
        tf.set_static("base_link", "camera_link", Transform3D::planar(0.5, 0.0, 0.0));

        let t = tf.lookup("odom", "camera_link").unwrap();
        assert!((t.translation.x - 1.5).abs() < 1e-5);
    }

    #[test]
    fn lookup_walks_edges_backwards() {
        let mut tf = TfEngine::new();
        tf.set_static("base_link", "camera_link", Transform3D::planar(0.2, 0.1, 0.0));

        let t = tf.lookup("camera_link", "base_link").unwrap();
        assert!((t.translation.x + 0.2).abs() < 1e-5);
        assert!((t.translation.y + 0.1).abs() < 1e-5);
    }

    #[test]
    fn lookup_no_path_returns_none() {
        let mut tf = TfEngine::new();
        tf.set_static("odom", "base_link", Transform3D::planar(1.0, 0.0, 0.0));
        assert!(tf.lookup("odom", "ghost_frame").is_none());
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        // base_link at the odom origin, rotated 90° about Z; camera 1 m ahead
        // of the base ends up at (0, 1, 0) in odom.
        let mut tf = TfEngine::new();
        tf.set_static("odom", "base_link", Transform3D::planar(0.0, 0.0, FRAC_PI_2));
        tf.set_static("base_link", "camera_link", Transform3D::planar(1.0, 0.0, 0.0));

        let t = tf.lookup("odom", "camera_link").unwrap();
        assert!(t.translation.x.abs() < 1e-5, "x={}", t.translation.x);
        assert!((t.translation.y - 1.0).abs() < 1e-5, "y={}", t.translation.y);
    }

    #[test]
    fn lookup_at_ignores_stale_edges() {
        let now = Utc::now();
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", Transform3D::planar(1.0, 0.0, 0.0), now);

        assert!(tf.lookup_at("odom", "base_link", now).is_some());
        assert!(tf.lookup_at("odom", "base_link", now - ChronoDuration::seconds(1)).is_some());
        assert!(tf.lookup_at("odom", "base_link", now + ChronoDuration::seconds(1)).is_none());
        // The untimed lookup always uses the newest data.
        assert!(tf.lookup("odom", "base_link").is_some());
    }

    #[test]
    fn set_transform_overrides_previous() {
        let now = Utc::now();
        let mut tf = TfEngine::new();
        tf.set_transform("odom", "base_link", Transform3D::planar(1.0, 0.0, 0.0), now);
        tf.set_transform("odom", "base_link", Transform3D::planar(5.0, 0.0, 0.0), now);

        let t = tf.lookup("odom", "base_link").unwrap();
        assert!((t.translation.x - 5.0).abs() < 1e-5);
        let back = tf.lookup("base_link", "odom").unwrap();
        assert!((back.translation.x + 5.0).abs() < 1e-5);
    }

    // ── TfBuffer ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn buffer_resolves_available_transform() {
        let buffer = TfBuffer::new();
        buffer
            .set_static("camera_link", "base_link", Transform3D::planar(-0.2, 0.0, 0.0))
            .await;
        let t = buffer
            .lookup_transform("camera_link", "base_link", Utc::now())
            .await
            .unwrap();
        assert!((t.translation.x + 0.2).abs() < 1e-5);
    }

    #[tokio::test]
    async fn buffer_waits_for_late_edge() {
        let buffer = Arc::new(TfBuffer::new());
        let stamp = Utc::now();

        let writer = Arc::clone(&buffer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer
                .set_transform("odom", "base_link", Transform3D::planar(3.0, 0.0, 0.0), stamp)
                .await;
        });

        let t = tokio::time::timeout(
            Duration::from_secs(2),
            buffer.lookup_transform("odom", "base_link", stamp),
        )
        .await
        .expect("transform should arrive before the timeout")
        .unwrap();
        assert!((t.translation.x - 3.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn buffer_lookup_times_out_without_data() {
        let buffer = TfBuffer::new();
        let result = tokio::time::timeout(
            Duration::from_millis(10),
            buffer.lookup_transform("odom", "base_link", Utc::now()),
        )
        .await;
        assert!(result.is_err(), "lookup must keep waiting when no edge exists");
    }

    #[tokio::test]
    async fn buffer_reports_separate_trees() {
        let buffer = TfBuffer::new();
        let stamp = Utc::now();
        buffer.set_transform("odom", "base_link", Transform3D::identity(), stamp).await;
        buffer
            .set_static("map", "camera_link", Transform3D::planar(1.0, 0.0, 0.0))
            .await;

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            buffer.lookup_transform("camera_link", "base_link", stamp),
        )
        .await
        .expect("separate trees must not wait");
        assert_eq!(
            result,
            Err(TransformError::NoPath {
                reference: "camera_link".to_string(),
                frame: "base_link".to_string(),
            })
        );
    }

    #[test]
    fn has_frame_covers_both_ends_of_an_edge() {
        let mut tf = TfEngine::new();
        tf.set_static("odom", "base_link", Transform3D::identity());
        assert!(tf.has_frame("odom"));
        assert!(tf.has_frame("base_link"));
        assert!(!tf.has_frame("camera_link"));
    }
}
