//! Transport layer: broker abstraction and the MQTT implementation
//!
//! The [`Broker`] trait is the seam between connection I/O and the
//! supervision/monitoring logic, enabling dependency injection and
//! testing against a mock.

use crate::classifier::InboundMessage;
use crate::subscription::TopicSubscriptionPlan;
use tokio::sync::mpsc;

pub mod mqtt;

pub use mqtt::{
    BrokerConnection, ConnectError, ConnectionLostEvent, ConnectionParameters, ConnectionState,
    SubscribeError,
};

/// Control surface of one broker session.
///
/// Event streams are handed out separately (see [`BrokerStreams`]) so the
/// trait stays a pure control interface.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Establish a session; completes only on broker confirmation.
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Apply the whole subscription plan to the live session.
    async fn subscribe(&self, plan: &TopicSubscriptionPlan) -> Result<(), SubscribeError>;

    /// Best-effort graceful close; infallible and idempotent.
    async fn disconnect(&self);

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}

/// The two event streams one connection produces. Receivers survive
/// reconnects; there is exactly one consumer per stream.
pub struct BrokerStreams {
    pub messages: mpsc::Receiver<InboundMessage>,
    pub connection_lost: mpsc::Receiver<ConnectionLostEvent>,
}
