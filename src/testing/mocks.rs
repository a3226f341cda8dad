//! Mock broker implementation
//!
//! Records control operations and lets tests script connect/subscribe
//! failures, so the supervisor and monitor can be tested against loss
//! scenarios deterministically.

use crate::subscription::TopicSubscriptionPlan;
use crate::transport::{Broker, ConnectError, ConnectionState, SubscribeError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

fn encode_state(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Disconnected => 0,
        ConnectionState::Connecting => 1,
        ConnectionState::Connected => 2,
        ConnectionState::ReconnectPending => 3,
    }
}

fn decode_state(raw: u8) -> ConnectionState {
    match raw {
        1 => ConnectionState::Connecting,
        2 => ConnectionState::Connected,
        3 => ConnectionState::ReconnectPending,
        _ => ConnectionState::Disconnected,
    }
}

/// Scriptable in-memory broker.
#[derive(Default)]
pub struct MockBroker {
    state: AtomicU8,
    connect_calls: AtomicU32,
    connects_in_flight: AtomicU32,
    max_concurrent_connects: AtomicU32,
    fail_next_connects: AtomicU32,
    fail_next_subscribes: AtomicU32,
    disconnect_calls: AtomicU32,
    connect_delay_ms: AtomicU32,
    subscribe_plans: Mutex<Vec<TopicSubscriptionPlan>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail with a network error.
    pub fn fail_next_connects(&self, count: u32) {
        self.fail_next_connects.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` subscribe calls fail with a partial failure.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.fail_next_subscribes.store(count, Ordering::SeqCst);
    }

    /// Hold each connect attempt open for the given duration, to observe
    /// attempt concurrency.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u32, Ordering::SeqCst);
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(encode_state(state), Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Highest number of connect attempts ever observed in flight at once.
    pub fn max_concurrent_connects(&self) -> u32 {
        self.max_concurrent_connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub async fn subscribed_plans(&self) -> Vec<TopicSubscriptionPlan> {
        self.subscribe_plans.lock().await.clone()
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn connect(&self) -> Result<(), ConnectError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.connects_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_connects
            .fetch_max(in_flight, Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting);

        let delay_ms = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(u64::from(delay_ms))).await;
        }

        let result = if self
            .fail_next_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.set_state(ConnectionState::Disconnected);
            Err(ConnectError::NetworkUnreachable {
                cause: "scripted failure".to_string(),
            })
        } else {
            self.set_state(ConnectionState::Connected);
            Ok(())
        };

        self.connects_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn subscribe(&self, plan: &TopicSubscriptionPlan) -> Result<(), SubscribeError> {
        if self
            .fail_next_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let failed_filters = plan
                .filters()
                .iter()
                .map(|f| f.to_string())
                .collect();
            return Err(SubscribeError::PartialFailure { failed_filters });
        }

        self.subscribe_plans.lock().await.push(plan.clone());
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
    }

    fn state(&self) -> ConnectionState {
        decode_state(self.state.load(Ordering::SeqCst))
    }
}
