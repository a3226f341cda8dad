//! Assembled monitoring lifecycle
//!
//! Wires one broker connection to the classifier, the device registry,
//! the alert dispatcher, and the reconnect supervisor. Generic over
//! [`Broker`] so the whole lifecycle runs against a mock in tests.

use crate::alert::AlertSink;
use crate::classifier::{self, InboundMessage};
use crate::error::{MonitorError, MonitorResult};
use crate::observability::metrics::metrics;
use crate::registry::DeviceRegistry;
use crate::subscription::TopicSubscriptionPlan;
use crate::supervisor::{BackoffPolicy, ReconnectSupervisor};
use crate::transport::{Broker, BrokerStreams};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LOOP_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Long-lived alarm monitor over one broker connection.
pub struct AlarmMonitor<B: Broker + 'static> {
    broker: Arc<B>,
    plan: TopicSubscriptionPlan,
    backoff: BackoffPolicy,
    dispatcher: Arc<dyn AlertSink>,
    registry: Arc<Mutex<DeviceRegistry>>,
    streams: Option<BrokerStreams>,
    supervisor: Option<ReconnectSupervisor>,
    loop_stop: Option<watch::Sender<bool>>,
    loop_handle: Option<JoinHandle<()>>,
}

impl<B: Broker + 'static> AlarmMonitor<B> {
    /// Build a monitor over a connection and its stream pair, dispatching
    /// alarms into `dispatcher`. Uses the fixed device plan and default
    /// backoff unless overridden.
    pub fn new(broker: B, streams: BrokerStreams, dispatcher: Arc<dyn AlertSink>) -> Self {
        Self {
            broker: Arc::new(broker),
            plan: TopicSubscriptionPlan::device_default(),
            backoff: BackoffPolicy::default(),
            dispatcher,
            registry: Arc::new(Mutex::new(DeviceRegistry::new())),
            streams: Some(streams),
            supervisor: None,
            loop_stop: None,
            loop_handle: None,
        }
    }

    pub fn with_plan(mut self, plan: TopicSubscriptionPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Shared view of device and alarm state.
    pub fn registry(&self) -> Arc<Mutex<DeviceRegistry>> {
        self.registry.clone()
    }

    pub fn broker(&self) -> Arc<B> {
        self.broker.clone()
    }

    /// Connect, apply the subscription plan, and start the supervision
    /// and classification tasks.
    ///
    /// The initial connect/subscribe failure is returned to the caller;
    /// after a successful start, connection loss is handled internally by
    /// the supervisor and is never fatal.
    pub async fn start(&mut self) -> MonitorResult<()> {
        let streams = self.streams.take().ok_or(MonitorError::AlreadyStarted)?;

        if let Err(error) = self.broker.connect().await {
            self.streams = Some(streams);
            return Err(error.into());
        }
        if let Err(error) = self.broker.subscribe(&self.plan).await {
            self.broker.disconnect().await;
            self.streams = Some(streams);
            return Err(error.into());
        }

        self.supervisor = Some(ReconnectSupervisor::spawn(
            self.broker.clone(),
            self.plan.clone(),
            self.backoff.clone(),
            streams.connection_lost,
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        self.loop_handle = Some(tokio::spawn(run_message_loop(
            streams.messages,
            self.dispatcher.clone(),
            self.registry.clone(),
            stop_rx,
        )));
        self.loop_stop = Some(stop_tx);

        info!(filters = self.plan.len(), "alarm monitor started");
        Ok(())
    }

    /// Stop supervision, close the session, and drain the message loop.
    /// Safe to call when never started or already shut down.
    pub async fn shutdown(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.stop().await;
        }

        self.broker.disconnect().await;

        if let Some(stop) = self.loop_stop.take() {
            let _ = stop.send(true);
        }
        if let Some(handle) = self.loop_handle.take() {
            let abort = handle.abort_handle();
            if tokio::time::timeout(LOOP_SHUTDOWN_GRACE, handle)
                .await
                .is_err()
            {
                warn!("message loop did not stop in time, aborting");
                abort.abort();
            }
        }

        info!("alarm monitor shut down");
    }
}

/// Consume the message stream: registry update, classification, dispatch.
async fn run_message_loop(
    mut messages: mpsc::Receiver<InboundMessage>,
    dispatcher: Arc<dyn AlertSink>,
    registry: Arc<Mutex<DeviceRegistry>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    debug!("message loop running");
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            message = messages.recv() => match message {
                None => break,
                Some(message) => handle_message(message, dispatcher.as_ref(), &registry).await,
            }
        }
    }
    debug!("message loop stopped");
}

async fn handle_message(
    message: InboundMessage,
    dispatcher: &dyn AlertSink,
    registry: &Arc<Mutex<DeviceRegistry>>,
) {
    let classified = classifier::classify(&message);

    if let Ok(device_id) = classifier::device_id(&message.topic) {
        registry
            .lock()
            .await
            .observe_status(&device_id, classified.is_some(), message.received_at);
    }

    let Some(event) = classified else {
        return;
    };

    metrics().record_alarm_raised();
    info!(
        device_id = %event.device_id,
        topic = %event.topic,
        "alarm detected"
    );
    if let Err(error) = dispatcher.dispatch(event) {
        metrics().record_alarm_dropped();
        warn!(%error, "alarm event not delivered");
    }
}
