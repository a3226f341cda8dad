//! Connection parameters, state, and error taxonomy for the MQTT session
//!
//! Pure types and functions only; the session I/O lives in
//! [`super::client`].

use rumqttc::v5::MqttOptions;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default MQTT port when none is configured.
pub const DEFAULT_PORT: u16 = 1883;

/// Fixed bound on the connect handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Everything needed to open one broker session. Immutable once built.
///
/// Invariants: `port` is non-zero and `client_id` is non-empty and
/// broker-unique for the lifetime of a connection; violations surface as
/// [`ConnectError::InvalidParameters`] when the connection is opened.
#[derive(Clone, PartialEq)]
pub struct ConnectionParameters {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionParameters {
    pub fn new(host: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            client_id: client_id.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConnectError> {
        if self.host.is_empty() {
            return Err(ConnectError::InvalidParameters(
                "host must not be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConnectError::InvalidParameters(
                "port must be a positive 16-bit value".to_string(),
            ));
        }
        if self.client_id.is_empty() {
            return Err(ConnectError::InvalidParameters(
                "client id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// Credentials must not leak through logs or error chains.
impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Connection state, owned exclusively by the broker connection and
/// published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; the initial state, and the result of explicit disconnect.
    Disconnected,
    /// A connect handshake is in flight.
    Connecting,
    /// Session established and confirmed by ConnAck.
    Connected,
    /// The transport reported loss; awaiting an external reconnect.
    ReconnectPending,
}

/// Fired exactly once per transport-detected loss. Never fired after an
/// explicit disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionLostEvent {
    pub cause: String,
}

/// Connect failures, translated from the transport at the session boundary.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectError {
    #[error("broker rejected credentials ({code})")]
    AuthFailure { code: String },

    #[error("broker unreachable: {cause}")]
    NetworkUnreachable { cause: String },

    #[error("no ConnAck within {0:?}")]
    Timeout(Duration),

    #[error("a connect attempt is already in flight")]
    AlreadyConnecting,

    #[error("connect attempt aborted by disconnect")]
    Aborted,

    #[error("invalid connection parameters: {0}")]
    InvalidParameters(String),
}

/// Subscribe failures. The batch either applies fully or fails as a whole.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubscribeError {
    #[error("{} filter(s) failed to subscribe: {failed_filters:?}", failed_filters.len())]
    PartialFailure { failed_filters: BTreeSet<String> },

    #[error("not connected")]
    NotConnected,
}

/// Build rumqttc options from resolved parameters.
///
/// The underlying event loop only reconnects when it is polled again after
/// an error; the session driver never re-polls a failed loop, so all
/// reconnection stays with the supervisor.
pub(crate) fn configure_mqtt_options(params: &ConnectionParameters) -> MqttOptions {
    let mut options = MqttOptions::new(&params.client_id, &params.host, params.port);
    options.set_keep_alive(KEEP_ALIVE);

    if let Some(username) = &params.username {
        let password = params.password.clone().unwrap_or_default();
        options.set_credentials(username, password);
    }

    options
}
