//! Firewatch - resilient MQTT fire-alarm monitoring
//!
//! A long-lived, embeddable client that holds one session to an MQTT
//! broker, subscribes to a fixed set of device topics, classifies inbound
//! messages into alarm / non-alarm, and hands structured alarm events to a
//! presentation collaborator through a non-blocking queue.
//!
//! # Overview
//!
//! - [`transport::BrokerConnection`] owns the broker session: connect,
//!   subscribe, disconnect, and the message/loss event streams.
//! - [`supervisor::ReconnectSupervisor`] is the single owner of
//!   reconnection: bounded exponential backoff, retrying forever.
//! - [`classifier`] is the pure alarm decision over (topic, payload).
//! - [`alert`] defines the dispatch boundary toward presentation.
//! - [`monitor::AlarmMonitor`] assembles the above into one lifecycle.
//!
//! # Quick Start
//!
//! Classification is pure and usable standalone:
//!
//! ```rust
//! use firewatch::classifier::{classify, InboundMessage};
//!
//! let message = InboundMessage::new("devices/sensor7/alarm", "smoke detected");
//! let event = classify(&message).expect("alarm topic always classifies");
//! assert_eq!(event.device_id, "sensor7");
//! ```
//!
//! The assembled monitor runs against a real connection:
//!
//! ```rust,no_run
//! use firewatch::alert::QueuedDispatcher;
//! use firewatch::monitor::AlarmMonitor;
//! use firewatch::transport::{BrokerConnection, ConnectionParameters};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), firewatch::error::MonitorError> {
//! let params = ConnectionParameters::new("broker.local", "firewatch-1")
//!     .with_credentials("watcher", "secret");
//! let (connection, streams) = BrokerConnection::new(params);
//! let (dispatcher, mut alerts) = QueuedDispatcher::with_default_capacity();
//!
//! let mut monitor = AlarmMonitor::new(connection, streams, Arc::new(dispatcher));
//! monitor.start().await?;
//!
//! while let Some(event) = alerts.recv().await {
//!     println!("ALARM from {}: {}", event.device_id, event.raw_payload);
//! }
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod classifier;
pub mod config;
pub mod error;
pub mod monitor;
pub mod observability;
pub mod registry;
pub mod subscription;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use alert::{AlertSink, DispatchError, QueuedDispatcher};
pub use classifier::{classify, AlarmEvent, ClassifyError, InboundMessage};
pub use config::{ConfigError, MonitorConfig};
pub use error::{MonitorError, MonitorResult};
pub use monitor::AlarmMonitor;
pub use registry::DeviceRegistry;
pub use subscription::{Subscription, TopicSubscriptionPlan};
pub use supervisor::{BackoffPolicy, ReconnectSupervisor};
pub use transport::{
    Broker, BrokerConnection, BrokerStreams, ConnectError, ConnectionLostEvent,
    ConnectionParameters, ConnectionState, SubscribeError,
};
