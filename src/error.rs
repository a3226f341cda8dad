//! Umbrella error type for monitor lifecycle operations
//!
//! Component-local taxonomies live next to their components
//! ([`ConnectError`], [`SubscribeError`], [`ClassifyError`](crate::classifier::ClassifyError),
//! [`DispatchError`](crate::alert::DispatchError)); this type collects the
//! ones that can surface from the assembled monitor. Nothing here is fatal
//! to the hosting process.

use crate::config::ConfigError;
use crate::transport::{ConnectError, SubscribeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("subscribe failed: {0}")]
    Subscribe(#[from] SubscribeError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("monitor already started")]
    AlreadyStarted,
}

pub type MonitorResult<T> = Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_converts() {
        let error: MonitorError = ConnectError::AlreadyConnecting.into();
        assert!(matches!(error, MonitorError::Connect(_)));
        assert!(error.to_string().contains("connect failed"));
    }

    #[test]
    fn test_subscribe_error_converts() {
        let error: MonitorError = SubscribeError::NotConnected.into();
        assert!(matches!(error, MonitorError::Subscribe(_)));
    }
}
