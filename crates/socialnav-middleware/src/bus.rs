//! Typed, topic-based publish/subscribe bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Payloads are shared behind [`Arc`], so fan-out never copies a
//! depth frame or a cost map.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Detections`] | Detector output: keypoints plus the aligned depth frame |
//! | [`Topic::SocialMap`] | Finished egocentric social cost maps |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use socialnav_types::{CostMap, DetectionBatch, SocialError};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// Default channel capacity (number of buffered messages before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 64;

/// Routing lanes of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Detections,
    SocialMap,
}

/// Payload carried by a [`Message`].
#[derive(Debug, Clone)]
pub enum Payload {
    Detections(Arc<DetectionBatch>),
    SocialMap(Arc<CostMap>),
}

impl Payload {
    /// The topic this payload naturally belongs on.
    pub fn topic(&self) -> Topic {
        match self {
            Payload::Detections(_) => Topic::Detections,
            Payload::SocialMap(_) => Topic::SocialMap,
        }
    }
}

/// Envelope for everything travelling over the bus.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Publishing component, e.g. `"socialnav::node"`.
    pub source: String,
    pub payload: Payload,
}

impl Message {
    pub fn new(source: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Shared message bus.  Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    detections: broadcast::Sender<Message>,
    social_map: broadcast::Sender<Message>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (detections, _) = broadcast::channel(capacity);
        let (social_map, _) = broadcast::channel(capacity);
        Self { detections, social_map }
    }

    /// Publish `message` to `topic`.
    ///
    /// Returns the number of receivers handed the message, or
    /// [`SocialError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, message: Message) -> Result<usize, SocialError> {
        self.topic_sender(topic)
            .send(message)
            .map_err(|_| SocialError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Wrap `payload` in a fresh [`Message`] and publish it on its own topic.
    pub fn publish(&self, source: &str, payload: Payload) -> Result<usize, SocialError> {
        let topic = payload.topic();
        self.publish_to(topic, Message::new(source, payload))
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Message> {
        match topic {
            Topic::Detections => &self.detections,
            Topic::SocialMap => &self.social_map,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`].
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Message>,
}

impl TopicReceiver {
    /// Wait for the next message on this topic.
    ///
    /// Returns:
    /// * `Ok(message)` – a successfully received message.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   messages were dropped.
    /// * `Err(RecvError::Closed)` – every sender is gone.
    pub async fn recv(&mut self) -> Result<Message, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`TopicReceiver::recv`] but skips over lag, logging how much was
    /// dropped.  Returns `None` once the bus is closed.
    pub async fn recv_latest(&mut self) -> Option<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
