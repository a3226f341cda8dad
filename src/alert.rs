//! Alert dispatch boundary
//!
//! The core only defines the event shape and a non-blocking delivery
//! contract; rendering (notification, toast, sound) belongs to the
//! consuming collaborator. Dispatch must never stall the message loop, so
//! the provided implementation queues onto a bounded channel and returns.

use crate::classifier::AlarmEvent;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Default bound on the alert queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Dispatch failures. A full queue drops the event rather than blocking
/// message processing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("alert queue full, event dropped")]
    QueueFull,

    #[error("alert consumer gone")]
    Closed,
}

/// Delivery contract between the core and the presentation collaborator.
/// Implementations must return promptly; queue-and-return, never block.
pub trait AlertSink: Send + Sync {
    fn dispatch(&self, event: AlarmEvent) -> Result<(), DispatchError>;
}

/// Fire-and-forget dispatcher over a bounded queue. The collaborator
/// consumes the paired receiver at its own pace.
pub struct QueuedDispatcher {
    tx: mpsc::Sender<AlarmEvent>,
}

impl QueuedDispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AlarmEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn with_default_capacity() -> (Self, mpsc::Receiver<AlarmEvent>) {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl AlertSink for QueuedDispatcher {
    fn dispatch(&self, event: AlarmEvent) -> Result<(), DispatchError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(device_id = %event.device_id, "alert queue full, dropping event");
                Err(DispatchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(device_id = %event.device_id, "alert consumer gone, dropping event");
                Err(DispatchError::Closed)
            }
        }
    }
}

/// Render an event as the JSON payload presentation collaborators consume.
pub fn format_alert_payload(event: &AlarmEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
