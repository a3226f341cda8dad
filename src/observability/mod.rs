//! Observability: structured logging and operational counters

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, MetricsSnapshot};
