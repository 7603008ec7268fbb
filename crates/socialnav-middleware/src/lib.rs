//! `socialnav-middleware` – moves detections and social maps between
//! components without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Message, Payload, Topic, TopicReceiver};
