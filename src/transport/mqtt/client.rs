//! Broker session I/O: connect, subscribe, disconnect, and the session
//! driver task
//!
//! One [`BrokerConnection`] owns one physical session at a time. Each
//! successful connect spawns a driver task that polls the event loop and
//! feeds the message and loss streams; the driver never re-polls a failed
//! loop, so reconnection belongs entirely to the supervisor.

use super::connection::{
    configure_mqtt_options, ConnectError, ConnectionLostEvent, ConnectionParameters,
    ConnectionState, SubscribeError, CONNECT_TIMEOUT,
};
use super::events::{route_event, SessionEvent};
use crate::classifier::InboundMessage;
use crate::observability::metrics::metrics;
use crate::subscription::TopicSubscriptionPlan;
use crate::transport::{Broker, BrokerStreams};
use async_trait::async_trait;
use chrono::Utc;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MESSAGE_CHANNEL_CAPACITY: usize = 256;
const LOSS_CHANNEL_CAPACITY: usize = 16;
const DRIVER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// One physical broker session with typed control operations and event
/// streams. Independently constructible; no global state.
pub struct BrokerConnection {
    params: ConnectionParameters,
    connect_timeout: Duration,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    // Serializes connect attempts; try_lock failure means one is in flight.
    connect_gate: Mutex<()>,
    client: Mutex<Option<AsyncClient>>,
    cancel: Mutex<Option<watch::Sender<bool>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    message_tx: mpsc::Sender<InboundMessage>,
    lost_tx: mpsc::Sender<ConnectionLostEvent>,
}

impl BrokerConnection {
    /// Create a connection and the stream pair its consumers read from.
    /// The streams survive reconnects; only `connect`/`disconnect` change
    /// what feeds them.
    pub fn new(params: ConnectionParameters) -> (Self, BrokerStreams) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let (lost_tx, lost_rx) = mpsc::channel(LOSS_CHANNEL_CAPACITY);

        let connection = Self {
            params,
            connect_timeout: CONNECT_TIMEOUT,
            state_tx,
            state_rx,
            connect_gate: Mutex::new(()),
            client: Mutex::new(None),
            cancel: Mutex::new(None),
            driver: Mutex::new(None),
            message_tx,
            lost_tx,
        };

        let streams = BrokerStreams {
            messages: message_rx,
            connection_lost: lost_rx,
        };

        (connection, streams)
    }

    /// Override the fixed handshake bound. Test hook; production uses the
    /// 10-second default.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state changes.
    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Establish a session and wait for the broker's ConnAck.
    ///
    /// Returns only after the handshake is confirmed or classified as
    /// failed; bounded by the connect timeout. Concurrent attempts are
    /// rejected with [`ConnectError::AlreadyConnecting`].
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let _gate = self
            .connect_gate
            .try_lock()
            .map_err(|_| ConnectError::AlreadyConnecting)?;
        if self.state() == ConnectionState::Connected {
            return Err(ConnectError::AlreadyConnecting);
        }
        self.params.validate()?;

        metrics().record_connection_attempt();
        self.state_tx.send_replace(ConnectionState::Connecting);
        debug!(
            host = %self.params.host,
            port = self.params.port,
            client_id = %self.params.client_id,
            "opening broker session"
        );

        let options = configure_mqtt_options(&self.params);
        let (client, mut event_loop) = AsyncClient::new(options, 16);

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *self.cancel.lock().await = Some(cancel_tx);

        // Drive the fresh event loop inline until the broker answers the
        // handshake; only then does the session get a driver task. The
        // future borrows the loop and is dropped before the driver takes it.
        let outcome = tokio::time::timeout(
            self.connect_timeout,
            handshake(&mut event_loop, &mut cancel_rx),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                metrics().record_connection_failure();
                self.state_tx.send_replace(ConnectionState::Disconnected);
                warn!(%error, "connect failed");
                return Err(error);
            }
            Err(_) => {
                metrics().record_connection_failure();
                self.state_tx.send_replace(ConnectionState::Disconnected);
                warn!(timeout = ?self.connect_timeout, "connect timed out waiting for ConnAck");
                return Err(ConnectError::Timeout(self.connect_timeout));
            }
        }

        *self.client.lock().await = Some(client);
        self.state_tx.send_replace(ConnectionState::Connected);
        metrics().record_connection_established();
        info!(host = %self.params.host, port = self.params.port, "broker session established");

        let handle = tokio::spawn(drive_session(
            event_loop,
            self.state_tx.clone(),
            cancel_rx,
            self.message_tx.clone(),
            self.lost_tx.clone(),
        ));
        *self.driver.lock().await = Some(handle);

        Ok(())
    }

    /// Apply the whole subscription plan to the live session.
    ///
    /// Any per-filter failure fails the call with the set of filters that
    /// did not apply; the caller decides whether to retry the full batch.
    pub async fn subscribe(&self, plan: &TopicSubscriptionPlan) -> Result<(), SubscribeError> {
        if self.state() != ConnectionState::Connected {
            return Err(SubscribeError::NotConnected);
        }

        let client_guard = self.client.lock().await;
        let Some(client) = client_guard.as_ref() else {
            return Err(SubscribeError::NotConnected);
        };

        let mut failed_filters = BTreeSet::new();
        for subscription in plan.subscriptions() {
            if let Err(error) = client
                .subscribe(subscription.topic_filter.clone(), subscription.qos)
                .await
            {
                warn!(filter = %subscription.topic_filter, %error, "subscribe request failed");
                failed_filters.insert(subscription.topic_filter.clone());
            }
        }

        if failed_filters.is_empty() {
            info!(filters = plan.len(), "subscription plan applied");
            Ok(())
        } else {
            Err(SubscribeError::PartialFailure { failed_filters })
        }
    }

    /// Best-effort graceful close. Never fails, safe to call at any time,
    /// idempotent. Aborts an in-flight connect and suppresses the loss
    /// event a closing session would otherwise produce.
    pub async fn disconnect(&self) {
        // Cancel first so the driver treats the close as intentional.
        if let Some(cancel) = self.cancel.lock().await.take() {
            let _ = cancel.send(true);
        }

        if let Some(client) = self.client.lock().await.take() {
            if let Err(error) = client.disconnect().await {
                debug!(%error, "graceful DISCONNECT not delivered");
            }
        }

        if let Some(handle) = self.driver.lock().await.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(DRIVER_SHUTDOWN_GRACE, handle)
                .await
                .is_err()
            {
                warn!("session driver did not stop in time, aborting");
                abort.abort();
            }
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        debug!("broker session closed");
    }
}

impl Drop for BrokerConnection {
    fn drop(&mut self) {
        // Drop cannot await; signal the driver and detach. Callers wanting
        // a graceful close must call disconnect() explicitly.
        if let Ok(mut cancel) = self.cancel.try_lock() {
            if let Some(cancel) = cancel.take() {
                let _ = cancel.send(true);
            }
        }
        if let Ok(mut driver) = self.driver.try_lock() {
            if let Some(handle) = driver.take() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Broker for BrokerConnection {
    async fn connect(&self) -> Result<(), ConnectError> {
        BrokerConnection::connect(self).await
    }

    async fn subscribe(&self, plan: &TopicSubscriptionPlan) -> Result<(), SubscribeError> {
        BrokerConnection::subscribe(self, plan).await
    }

    async fn disconnect(&self) {
        BrokerConnection::disconnect(self).await
    }

    fn state(&self) -> ConnectionState {
        BrokerConnection::state(self)
    }
}

/// Poll the event loop until the broker answers the connect handshake.
async fn handshake(
    event_loop: &mut EventLoop,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<(), ConnectError> {
    loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    return Err(ConnectError::Aborted);
                }
            }
            polled = event_loop.poll() => match polled {
                Ok(event) => match route_event(&event) {
                    SessionEvent::ConnAck { accepted } => return accepted,
                    _ => continue,
                },
                Err(error) => {
                    return Err(super::events::translate_connection_error(&error));
                }
            }
        }
    }
}

/// Poll one session's event loop until it dies or is cancelled.
///
/// Ordering: the loop returns immediately after reporting a loss, so no
/// inbound message is ever delivered after its session's loss event.
async fn drive_session(
    mut event_loop: EventLoop,
    state_tx: watch::Sender<ConnectionState>,
    mut cancel_rx: watch::Receiver<bool>,
    message_tx: mpsc::Sender<InboundMessage>,
    lost_tx: mpsc::Sender<ConnectionLostEvent>,
) {
    loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    state_tx.send_replace(ConnectionState::Disconnected);
                    debug!("session driver stopped by disconnect");
                    return;
                }
            }
            polled = event_loop.poll() => match polled {
                Ok(event) => match route_event(&event) {
                    SessionEvent::Publish { topic, payload, retain: _ } => {
                        metrics().record_message_received();
                        let message = InboundMessage {
                            topic,
                            payload,
                            received_at: Utc::now(),
                        };
                        if message_tx.send(message).await.is_err() {
                            debug!("message stream receiver dropped");
                        }
                    }
                    SessionEvent::Disconnected => {
                        report_loss(
                            &state_tx,
                            &lost_tx,
                            &cancel_rx,
                            "broker sent DISCONNECT".to_string(),
                        )
                        .await;
                        return;
                    }
                    SessionEvent::SubAck { packet_id } => {
                        debug!(packet_id, "subscription confirmed");
                    }
                    SessionEvent::ConnAck { .. } | SessionEvent::Other(_) | SessionEvent::Outgoing => {}
                },
                Err(error) => {
                    report_loss(&state_tx, &lost_tx, &cancel_rx, error.to_string()).await;
                    return;
                }
            }
        }
    }
}

async fn report_loss(
    state_tx: &watch::Sender<ConnectionState>,
    lost_tx: &mpsc::Sender<ConnectionLostEvent>,
    cancel_rx: &watch::Receiver<bool>,
    cause: String,
) {
    if *cancel_rx.borrow() {
        // Explicit disconnect already in progress; not a loss.
        state_tx.send_replace(ConnectionState::Disconnected);
        return;
    }

    state_tx.send_replace(ConnectionState::ReconnectPending);
    metrics().record_connection_lost();
    warn!(%cause, "connection to broker lost");
    if lost_tx.send(ConnectionLostEvent { cause }).await.is_err() {
        debug!("loss stream receiver dropped");
    }
}
