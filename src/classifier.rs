//! Pure alarm classification for inbound device messages
//!
//! Classification is a stateless function over (topic, payload); it never
//! blocks and is safe to call concurrently for independent messages. The
//! rule matches the deployed fleet's convention: a message is an alarm when
//! its topic ends in `/alarm` or its payload mentions "alarm" in any case.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Literal topic suffix that marks a dedicated alarm topic.
const ALARM_TOPIC_SUFFIX: &str = "/alarm";

/// Case-insensitive payload keyword that marks an alarm condition.
const ALARM_KEYWORD: &str = "alarm";

/// Device id reported when the topic shape does not carry one.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// A message delivered by the broker for one subscribed topic.
///
/// Transient: produced by the connection, consumed immediately by the
/// classifier, never retained.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// A positively classified alarm, ready for dispatch.
///
/// Immutable after creation; owned by the dispatcher once handed off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub device_id: String,
    pub topic: String,
    pub raw_payload: String,
    pub detected_at: DateTime<Utc>,
}

/// Classification failures. Non-fatal: a malformed topic degrades the
/// event's metadata, it never suppresses the alarm itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("topic '{topic}' has no device segment")]
    MalformedTopic { topic: String },
}

/// Decide whether `message` represents an alarm condition.
///
/// Returns the alarm event on a match. A topic without a second path
/// segment still raises the event with `device_id` = [`UNKNOWN_DEVICE`]:
/// fail open, never drop a real alarm over a topic-shape anomaly.
pub fn classify(message: &InboundMessage) -> Option<AlarmEvent> {
    let text = String::from_utf8_lossy(&message.payload);

    if !is_alarm_signal(&message.topic, &text) {
        return None;
    }

    let device_id = match device_id(&message.topic) {
        Ok(id) => id,
        Err(error) => {
            warn!(topic = %message.topic, %error, "alarm on malformed topic, reporting unknown device");
            UNKNOWN_DEVICE.to_string()
        }
    };

    Some(AlarmEvent {
        device_id,
        topic: message.topic.clone(),
        raw_payload: text.into_owned(),
        detected_at: message.received_at,
    })
}

/// The match rule: alarm topic suffix, or the keyword anywhere in the
/// payload text, case-insensitively.
pub fn is_alarm_signal(topic: &str, payload_text: &str) -> bool {
    topic.ends_with(ALARM_TOPIC_SUFFIX) || payload_text.to_lowercase().contains(ALARM_KEYWORD)
}

/// Extract the device id: the second `/`-separated topic segment.
pub fn device_id(topic: &str) -> Result<String, ClassifyError> {
    match topic.split('/').nth(1) {
        Some(segment) if !segment.is_empty() => Ok(segment.to_string()),
        _ => Err(ClassifyError::MalformedTopic {
            topic: topic.to_string(),
        }),
    }
}
