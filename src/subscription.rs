//! Fixed subscription plan for device topics
//!
//! The plan is a pure data value so it can be unit-tested and swapped
//! without touching connection logic. It is applied as one batch after
//! every successful (re)connect.

use rumqttc::v5::mqttbytes::QoS;

/// A single topic filter with its desired delivery guarantee.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// MQTT topic filter; `+` matches a single level.
    pub topic_filter: String,
    pub qos: QoS,
}

impl Subscription {
    pub fn new(topic_filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic_filter: topic_filter.into(),
            qos,
        }
    }
}

/// Ordered set of filters the client must hold after each (re)connect.
///
/// Order is irrelevant to correctness; the batch is applied atomically in
/// the sense that a partial failure fails the whole application and the
/// caller decides whether to retry the full batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TopicSubscriptionPlan {
    subscriptions: Vec<Subscription>,
}

impl TopicSubscriptionPlan {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions }
    }

    /// The fixed plan for fire-alarm monitoring: every device's status and
    /// alarm topic, at-least-once delivery.
    pub fn device_default() -> Self {
        Self::new(vec![
            Subscription::new("devices/+/status", QoS::AtLeastOnce),
            Subscription::new("devices/+/alarm", QoS::AtLeastOnce),
        ])
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Topic filters only, in plan order.
    pub fn filters(&self) -> Vec<&str> {
        self.subscriptions
            .iter()
            .map(|s| s.topic_filter.as_str())
            .collect()
    }
}
