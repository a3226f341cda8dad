//! Supervised reconnection: the single owner of reconnect attempts
//!
//! The supervisor consumes the connection-loss stream and re-establishes
//! the session with the connection's original parameters, re-applying the
//! subscription plan before the session counts as live. Loss events are
//! processed one at a time by a single task, so at most one attempt is
//! ever in flight. It retries forever with bounded exponential backoff;
//! failure here is logged, never fatal.

use crate::observability::metrics::metrics;
use crate::subscription::TopicSubscriptionPlan;
use crate::transport::{Broker, ConnectError, ConnectionLostEvent, ConnectionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const STOP_GRACE: Duration = Duration::from_secs(2);

/// Bounded exponential backoff between reconnect attempts.
///
/// Delays double from `initial` up to `cap` and reset after a successful
/// reconnect. Keeps the unattended client from hot-looping against an
/// unreachable broker while preserving retry-forever semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(15);
        let delay = self.initial.saturating_mul(1u32 << doublings);
        delay.min(self.cap)
    }
}

/// Handle to the spawned supervision task.
pub struct ReconnectSupervisor {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ReconnectSupervisor {
    /// Spawn the supervision task over the connection's loss stream.
    pub fn spawn<B: Broker + 'static>(
        broker: Arc<B>,
        plan: TopicSubscriptionPlan,
        policy: BackoffPolicy,
        lost_rx: mpsc::Receiver<ConnectionLostEvent>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(supervise(broker, plan, policy, lost_rx, stop_rx));
        Self { stop_tx, handle }
    }

    /// Stop supervising; suppresses any further reconnect attempts.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let abort = self.handle.abort_handle();
        if tokio::time::timeout(STOP_GRACE, self.handle).await.is_err() {
            warn!("reconnect supervisor did not stop in time, aborting");
            abort.abort();
        }
    }
}

async fn supervise<B: Broker>(
    broker: Arc<B>,
    plan: TopicSubscriptionPlan,
    policy: BackoffPolicy,
    mut lost_rx: mpsc::Receiver<ConnectionLostEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    debug!("reconnect supervisor running");
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            event = lost_rx.recv() => match event {
                None => break,
                Some(ConnectionLostEvent { cause }) => {
                    if broker.state() == ConnectionState::Connected {
                        // A later connect already succeeded; nothing to do.
                        debug!(%cause, "ignoring stale loss event");
                        continue;
                    }
                    info!(%cause, "reconnect requested");
                    if !reestablish(broker.as_ref(), &plan, &policy, &mut stop_rx).await {
                        break;
                    }
                }
            }
        }
    }
    debug!("reconnect supervisor stopped");
}

/// Retry connect + subscribe until the session is live again or the
/// supervisor is stopped. Returns false when stopped.
async fn reestablish<B: Broker + ?Sized>(
    broker: &B,
    plan: &TopicSubscriptionPlan,
    policy: &BackoffPolicy,
    stop_rx: &mut watch::Receiver<bool>,
) -> bool {
    let mut attempt: u32 = 0;
    loop {
        if *stop_rx.borrow() {
            return false;
        }
        attempt += 1;

        match broker.connect().await {
            Ok(()) => match broker.subscribe(plan).await {
                Ok(()) => {
                    metrics().record_reconnection();
                    info!(attempt, "session reestablished and plan reapplied");
                    return true;
                }
                Err(error) => {
                    // The plan applies atomically or not at all; retry the
                    // full batch on a fresh session.
                    warn!(attempt, %error, "resubscribe failed, retrying full batch");
                    broker.disconnect().await;
                }
            },
            Err(ConnectError::Aborted) => {
                info!("reconnect aborted by disconnect");
                return false;
            }
            Err(ConnectError::AlreadyConnecting) => {
                // Someone else owns an attempt right now; defer to it.
                debug!("connect already in flight elsewhere, standing down");
                return true;
            }
            Err(error) => {
                warn!(attempt, %error, "reconnect attempt failed");
            }
        }

        let delay = policy.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
        if !interruptible_sleep(stop_rx, delay).await {
            return false;
        }
    }
}

/// Sleep that a stop signal can cut short. Returns false when stopped.
async fn interruptible_sleep(stop_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = stop_rx.changed() => changed.is_ok() && !*stop_rx.borrow(),
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_cap() {
        let policy = BackoffPolicy::default();

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(50), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_attempt_counter_resets_per_outage() {
        // delay_for is pure in the attempt number; a fresh outage starts
        // from the initial delay again
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), policy.initial);
    }

    #[test]
    fn test_custom_backoff() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(100),
            cap: Duration::from_millis(250),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_interruptible_sleep_completes() {
        let (_stop_tx, mut stop_rx) = watch::channel(false);
        assert!(interruptible_sleep(&mut stop_rx, Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_interruptible_sleep_cut_short_by_stop() {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = stop_tx.send(true);
        });
        assert!(!interruptible_sleep(&mut stop_rx, Duration::from_secs(5)).await);
    }
}
