//! TOML configuration layer for embedding hosts
//!
//! Convenience only: hosts that already hold resolved
//! [`ConnectionParameters`](crate::transport::ConnectionParameters) can
//! skip this module entirely. Credentials are never stored in the file;
//! the config names environment variables and `resolve()` reads them.

use crate::transport::ConnectionParameters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    pub mqtt: MqttSection,
    #[serde(default)]
    pub alerting: AlertingSection,
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Broker-unique client identifier.
    pub client_id: String,
    /// Environment variable containing the username.
    pub username_env: Option<String>,
    /// Environment variable containing the password.
    pub password_env: Option<String>,
}

fn default_port() -> u16 {
    crate::transport::mqtt::DEFAULT_PORT
}

/// Alert queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertingSection {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    crate::alert::DEFAULT_QUEUE_CAPACITY
}

impl Default for AlertingSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("environment variable '{var}' is not set")]
    MissingEnv { var: String },
}

impl MonitorConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.is_empty() {
            return Err(ConfigError::Invalid("mqtt.host must not be empty".into()));
        }
        if self.mqtt.port == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.port must be a positive 16-bit value".into(),
            ));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Invalid(
                "mqtt.client_id must not be empty".into(),
            ));
        }
        if self.alerting.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "alerting.queue_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve credentials from the environment and produce the immutable
    /// parameter object the connection consumes. A config without
    /// `username_env` yields anonymous parameters; a named but unset
    /// variable is an error.
    pub fn resolve_connection_parameters(&self) -> Result<ConnectionParameters, ConfigError> {
        let mut params = ConnectionParameters::new(&self.mqtt.host, &self.mqtt.client_id)
            .with_port(self.mqtt.port);

        if let Some(username_env) = &self.mqtt.username_env {
            let username = std::env::var(username_env).map_err(|_| ConfigError::MissingEnv {
                var: username_env.clone(),
            })?;
            let password = match &self.mqtt.password_env {
                Some(password_env) => {
                    std::env::var(password_env).map_err(|_| ConfigError::MissingEnv {
                        var: password_env.clone(),
                    })?
                }
                None => String::new(),
            };
            params = params.with_credentials(username, password);
        }

        Ok(params)
    }
}
