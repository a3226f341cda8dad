//! Operational counters for the connection and alert pipeline
//!
//! Atomic counters behind a process-wide collector; cheap enough to bump
//! from the session driver's hot path. `snapshot()` produces a
//! serializable view for health reporting by the host.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

#[derive(Default)]
pub struct MetricsCollector {
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    connections_lost: AtomicU64,
    reconnections: AtomicU64,
    messages_received: AtomicU64,
    alarms_raised: AtomicU64,
    alarms_dropped: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alarm_raised(&self) {
        self.alarms_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alarm_dropped(&self) {
        self.alarms_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connections_established: self.connections_established.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            connections_lost: self.connections_lost.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            alarms_raised: self.alarms_raised.load(Ordering::Relaxed),
            alarms_dropped: self.alarms_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of all counters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub connections_lost: u64,
    pub reconnections: u64,
    pub messages_received: u64,
    pub alarms_raised: u64,
    pub alarms_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let collector = MetricsCollector::new();

        collector.record_connection_attempt();
        collector.record_connection_established();
        collector.record_message_received();
        collector.record_message_received();
        collector.record_alarm_raised();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.connection_attempts, 1);
        assert_eq!(snapshot.connections_established, 1);
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.alarms_raised, 1);
        assert_eq!(snapshot.connection_failures, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let collector = MetricsCollector::new();
        collector.record_alarm_raised();

        let json = serde_json::to_string(&collector.snapshot()).unwrap();
        assert!(json.contains("\"alarms_raised\":1"));
    }

    #[test]
    fn test_global_collector_is_shared() {
        let before = metrics().snapshot().messages_received;
        metrics().record_message_received();
        assert!(metrics().snapshot().messages_received > before);
    }
}
