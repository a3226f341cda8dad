//! End-to-end monitor behavior over a mock broker: loss, recovery, and
//! the classify-and-dispatch path

use firewatch::alert::QueuedDispatcher;
use firewatch::classifier::InboundMessage;
use firewatch::monitor::AlarmMonitor;
use firewatch::subscription::TopicSubscriptionPlan;
use firewatch::supervisor::BackoffPolicy;
use firewatch::testing::MockBroker;
use firewatch::transport::{Broker, BrokerStreams, ConnectionLostEvent, ConnectionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    monitor: AlarmMonitor<MockBroker>,
    message_tx: mpsc::Sender<InboundMessage>,
    lost_tx: mpsc::Sender<ConnectionLostEvent>,
    alerts: mpsc::Receiver<firewatch::AlarmEvent>,
}

fn harness() -> Harness {
    let (message_tx, messages) = mpsc::channel(32);
    let (lost_tx, connection_lost) = mpsc::channel(8);
    let streams = BrokerStreams {
        messages,
        connection_lost,
    };
    let (dispatcher, alerts) = QueuedDispatcher::new(32);
    let monitor = AlarmMonitor::new(MockBroker::new(), streams, Arc::new(dispatcher)).with_backoff(
        BackoffPolicy {
            initial: Duration::from_millis(5),
            cap: Duration::from_millis(20),
        },
    );

    Harness {
        monitor,
        message_tx,
        lost_tx,
        alerts,
    }
}

#[tokio::test]
async fn test_connection_loss_recovers_and_messages_keep_flowing() {
    let mut h = harness();
    h.monitor.start().await.unwrap();
    let broker = h.monitor.broker();
    assert_eq!(broker.connect_count(), 1);

    // Simulate transport loss
    broker.set_state(ConnectionState::ReconnectPending);
    h.lost_tx
        .send(ConnectionLostEvent {
            cause: "keep-alive timeout".to_string(),
        })
        .await
        .unwrap();

    // Supervisor reconnects with the original parameters and reapplies
    // the plan before the session counts as live
    for _ in 0..200 {
        if broker.state() == ConnectionState::Connected && broker.connect_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(broker.connect_count(), 2);
    let plans = broker.subscribed_plans().await;
    assert_eq!(plans.len(), 2);
    assert!(plans
        .iter()
        .all(|p| *p == TopicSubscriptionPlan::device_default()));

    // The pipeline still delivers alarms after recovery
    h.message_tx
        .send(InboundMessage::new("devices/sensor7/alarm", "smoke"))
        .await
        .unwrap();
    let event = h.alerts.recv().await.expect("alarm after reconnect");
    assert_eq!(event.device_id, "sensor7");

    h.monitor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_suppresses_reconnects() {
    let mut h = harness();
    h.monitor.start().await.unwrap();
    let broker = h.monitor.broker();

    h.monitor.shutdown().await;
    let connects_after_shutdown = broker.connect_count();

    // A loss event arriving after shutdown must not trigger a reconnect
    broker.set_state(ConnectionState::Disconnected);
    let _ = h
        .lost_tx
        .send(ConnectionLostEvent {
            cause: "late loss".to_string(),
        })
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(broker.connect_count(), connects_after_shutdown);
    assert_eq!(broker.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_malformed_topic_alarm_still_dispatches() {
    let mut h = harness();
    h.monitor.start().await.unwrap();

    h.message_tx
        .send(InboundMessage::new("bad", "ALARM triggered"))
        .await
        .unwrap();

    let event = h.alerts.recv().await.expect("fail-open alarm");
    assert_eq!(event.device_id, "unknown");
    assert_eq!(event.raw_payload, "ALARM triggered");

    h.monitor.shutdown().await;
}

#[tokio::test]
async fn test_mixed_traffic_only_alarms_dispatch() {
    let mut h = harness();
    h.monitor.start().await.unwrap();

    for (topic, payload) in [
        ("devices/a/status", "temperature 21C"),
        ("devices/b/alarm", "OK"),
        ("devices/c/status", "ALARM smoke"),
        ("devices/d/status", "humidity 40%"),
    ] {
        h.message_tx
            .send(InboundMessage::new(topic, payload))
            .await
            .unwrap();
    }

    let first = h.alerts.recv().await.expect("first alarm");
    let second = h.alerts.recv().await.expect("second alarm");
    assert_eq!(first.device_id, "b");
    assert_eq!(second.device_id, "c");
    assert!(h.alerts.try_recv().is_err());

    // Registry saw all four devices
    let registry = h.monitor.registry();
    assert_eq!(registry.lock().await.devices().len(), 4);

    h.monitor.shutdown().await;
}
