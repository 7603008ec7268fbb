//! `socialnav-perception` – from detector keypoints to located people.
//!
//! # Modules
//!
//! - [`camera`] – [`CameraModel`][camera::CameraModel]: resolution and field
//!   of view of the depth-aligned camera.
//! - [`keypoint`] – [`Keypoint`][keypoint::Keypoint] and the pinhole
//!   back-projection of a pixel plus its depth patch into the sensor frame.
//! - [`person`] – [`PoseEstimator`][person::PoseEstimator]: planar position
//!   and facing direction of a [`Person`][person::Person] with an explicit
//!   shoulder → hip fallback.
//! - [`transform`] – [`TfEngine`][transform::TfEngine] and
//!   [`TfBuffer`][transform::TfBuffer]: graph of reference frames and the
//!   async [`TransformSource`][transform::TransformSource] used to place
//!   people relative to the robot.

pub mod camera;
pub mod keypoint;
pub mod person;
pub mod transform;

pub use camera::CameraModel;
pub use keypoint::Keypoint;
pub use person::{DepthSampling, OrientationError, Person, PoseEstimator, PositionError};
pub use transform::{TfBuffer, TfEngine, Transform3D, TransformError, TransformSource};
