//! [`SocialMapNode`] – one social cost map per detection batch.
//!
//! Each cycle:
//!
//! 1. **Locate the robot** – ask the [`TransformSource`] for the robot's pose
//!    in the detection frame at the batch timestamp, bounded by the
//!    configured wait.  Failure abandons the cycle.
//! 2. **Estimate** – position and orientation for every detected person.
//!    Per-person failures never abort the batch.
//! 3. **Compose** – draw every located person into a fresh map.
//! 4. **Publish** – hand the map to `SocialMap` subscribers and keep it as
//!    the last known good map.
//!
//! [`SocialMapNode::run`] drives the cycle from the `Detections` topic,
//! strictly one batch at a time.

use std::sync::Arc;
use std::time::Duration;

use socialnav_costmap::{CostMapCompositor, LocatedPerson, ProxemicZoneModel};
use socialnav_middleware::{EventBus, Payload, TopicReceiver};
use socialnav_perception::{Person, PoseEstimator, Transform3D, TransformSource};
use socialnav_types::{CostMap, DetectionBatch, FrameHeader, SocialError};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::SocialMapConfig;

/// Source name stamped on published messages.
pub const NODE_SOURCE: &str = "socialnav::node";

pub struct SocialMapNode {
    estimator: PoseEstimator,
    zones: ProxemicZoneModel,
    compositor: CostMapCompositor,
    transforms: Arc<dyn TransformSource>,
    bus: EventBus,
    robot_frame: String,
    wait: Duration,
    last_map: Option<Arc<CostMap>>,
}

impl SocialMapNode {
    /// Validate `config` and precompute the proxemic kernels.
    pub fn new(
        config: &SocialMapConfig,
        transforms: Arc<dyn TransformSource>,
        bus: EventBus,
    ) -> Result<Self, SocialError> {
        config.validate()?;
        let zones = ProxemicZoneModel::new(&config.proxemics, config.map.resolution_m, config.map.max_cost)?;
        info!(
            buckets = zones.zones().len(),
            robot_frame = %config.transform.robot_frame,
            "social map node ready"
        );
        Ok(Self {
            estimator: PoseEstimator::new(config.camera, config.sampling),
            zones,
            compositor: CostMapCompositor::new(config.map.clone(), config.transform.apply_rotation),
            transforms,
            bus,
            robot_frame: config.transform.robot_frame.clone(),
            wait: Duration::from_millis(config.transform.wait_ms),
            last_map: None,
        })
    }

    /// Most recently published map, if any cycle has succeeded yet.
    pub fn last_map(&self) -> Option<Arc<CostMap>> {
        self.last_map.clone()
    }

    /// Run one full cycle for `batch`.
    ///
    /// # Errors
    ///
    /// [`SocialError::TransformUnavailable`] when the robot pose cannot be
    /// resolved within the wait; nothing is published and
    /// [`SocialMapNode::last_map`] keeps the previous map.
    #[instrument(skip_all, fields(frame = %batch.header.frame_id, persons = batch.persons.len()))]
    pub async fn process(&mut self, batch: &DetectionBatch) -> Result<Arc<CostMap>, SocialError> {
        let robot = self.robot_pose(&batch.header).await?;

        let mut located = Vec::with_capacity(batch.persons.len());
        for detection in &batch.persons {
            let mut person = Person::new(detection, &batch.depth);
            self.estimator.estimate(&mut person);
            if let Err(e) = person.orientation() {
                debug!(track_id = ?detection.track_id, reason = %e, "orientation unavailable; drawing unrotated");
            }
            match LocatedPerson::from_person(&person) {
                Some(p) => located.push(p),
                None => debug!(track_id = ?detection.track_id, "person has no localisable position; skipped"),
            }
        }

        let header = FrameHeader::new(self.robot_frame.clone(), batch.header.stamp);
        let (map, stats) = self.compositor.compose(&located, &self.zones, &robot, header);
        if stats.out_of_bounds > 0 {
            debug!(out_of_bounds = stats.out_of_bounds, "persons outside the social map");
        }
        let map = Arc::new(map);

        match self.bus.publish(NODE_SOURCE, Payload::SocialMap(Arc::clone(&map))) {
            Ok(receivers) => debug!(receivers, drawn = stats.drawn, "social map published"),
            Err(e) => debug!(error = %e, drawn = stats.drawn, "social map built without subscribers"),
        }
        self.last_map = Some(Arc::clone(&map));
        Ok(map)
    }

    /// Consume `detections` until `shutdown` flips to `true` or the bus
    /// closes.  Failed cycles are logged and skipped.
    ///
    /// The receiver is passed in so that callers can subscribe before the
    /// first batch is published.
    pub async fn run(&mut self, mut detections: TopicReceiver, mut shutdown: watch::Receiver<bool>) {
        info!("social map node running");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                message = detections.recv_latest() => {
                    let Some(message) = message else {
                        break;
                    };
                    let Payload::Detections(batch) = message.payload else {
                        continue;
                    };
                    if let Err(e) = self.process(&batch).await {
                        warn!(error = %e, "social map cycle abandoned");
                    }
                }
            }
        }
        info!("social map node stopped");
    }

    async fn robot_pose(&self, header: &FrameHeader) -> Result<Transform3D, SocialError> {
        let unavailable = |reason: String| SocialError::TransformUnavailable {
            reference: header.frame_id.clone(),
            frame: self.robot_frame.clone(),
            reason,
        };
        let lookup = self
            .transforms
            .lookup_transform(&header.frame_id, &self.robot_frame, header.stamp);
        match tokio::time::timeout(self.wait, lookup).await {
            Ok(Ok(pose)) => Ok(pose),
            Ok(Err(e)) => Err(unavailable(e.to_string())),
            Err(_) => Err(unavailable(format!("timed out after {} ms", self.wait.as_millis()))),
        }
    }
}
