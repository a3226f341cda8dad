//! Pure routing of rumqttc events into session-level decisions
//!
//! Keeps the session driver free of packet-level detail and makes the
//! routing independently testable.

use super::connection::ConnectError;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::{ConnectionError, Event};

/// What one polled event means for the session.
#[derive(Debug, Clone)]
pub(crate) enum SessionEvent {
    /// Broker answered the connect handshake.
    ConnAck { accepted: Result<(), ConnectError> },
    /// A message arrived on a subscribed topic.
    Publish {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    /// Broker closed the session with a DISCONNECT packet.
    Disconnected,
    /// Broker confirmed a subscription batch entry.
    SubAck { packet_id: u16 },
    /// Keep-alive and other protocol chatter.
    Other(String),
    /// Outbound traffic acknowledged by the event loop.
    Outgoing,
}

pub(crate) fn route_event(event: &Event) -> SessionEvent {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(ack) => SessionEvent::ConnAck {
                accepted: connack_outcome(&ack.code),
            },
            Packet::Publish(publish) => SessionEvent::Publish {
                topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                payload: publish.payload.clone(),
                retain: publish.retain,
            },
            Packet::Disconnect(_) => SessionEvent::Disconnected,
            Packet::SubAck(suback) => SessionEvent::SubAck {
                packet_id: suback.pkid,
            },
            other => SessionEvent::Other(format!("{other:?}")),
        },
        Event::Outgoing(_) => SessionEvent::Outgoing,
    }
}

/// Classify a ConnAck reason code into the connect taxonomy.
pub(crate) fn connack_outcome(code: &ConnectReturnCode) -> Result<(), ConnectError> {
    match code {
        ConnectReturnCode::Success => Ok(()),
        ConnectReturnCode::BadUserNamePassword
        | ConnectReturnCode::NotAuthorized
        | ConnectReturnCode::Banned => Err(ConnectError::AuthFailure {
            code: format!("{code:?}"),
        }),
        other => Err(ConnectError::NetworkUnreachable {
            cause: format!("broker refused connection: {other:?}"),
        }),
    }
}

/// Translate a transport-level error into the connect taxonomy. No raw
/// rumqttc error crosses this boundary.
pub(crate) fn translate_connection_error(error: &ConnectionError) -> ConnectError {
    match error {
        ConnectionError::ConnectionRefused(code) => connack_outcome(code)
            .err()
            .unwrap_or_else(|| ConnectError::NetworkUnreachable {
                cause: "broker refused an accepted connection".to_string(),
            }),
        ConnectionError::Io(io) => ConnectError::NetworkUnreachable {
            cause: io.to_string(),
        },
        other => ConnectError::NetworkUnreachable {
            cause: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{ConnAck, Disconnect, DisconnectReasonCode, Publish};
    use rumqttc::v5::mqttbytes::QoS;

    #[test]
    fn test_successful_connack_routes_as_accepted() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));

        match route_event(&event) {
            SessionEvent::ConnAck { accepted } => assert!(accepted.is_ok()),
            other => panic!("expected ConnAck route, got {other:?}"),
        }
    }

    #[test]
    fn test_auth_rejections_classify_as_auth_failure() {
        for code in [
            ConnectReturnCode::BadUserNamePassword,
            ConnectReturnCode::NotAuthorized,
            ConnectReturnCode::Banned,
        ] {
            assert!(matches!(
                connack_outcome(&code),
                Err(ConnectError::AuthFailure { .. })
            ));
        }
    }

    #[test]
    fn test_other_rejections_classify_as_unreachable() {
        assert!(matches!(
            connack_outcome(&ConnectReturnCode::ServerUnavailable),
            Err(ConnectError::NetworkUnreachable { .. })
        ));
    }

    #[test]
    fn test_publish_routes_with_topic_and_payload() {
        let event = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: Bytes::from("devices/s1/alarm"),
            pkid: 1,
            payload: Bytes::from("smoke"),
            properties: None,
        }));

        match route_event(&event) {
            SessionEvent::Publish {
                topic,
                payload,
                retain,
            } => {
                assert_eq!(topic, "devices/s1/alarm");
                assert_eq!(payload, Bytes::from("smoke"));
                assert!(!retain);
            }
            other => panic!("expected Publish route, got {other:?}"),
        }
    }

    #[test]
    fn test_broker_disconnect_routes_as_loss() {
        let event = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert!(matches!(route_event(&event), SessionEvent::Disconnected));
    }

    #[test]
    fn test_io_error_translates_to_unreachable() {
        let error = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert!(matches!(
            translate_connection_error(&error),
            ConnectError::NetworkUnreachable { .. }
        ));
    }

    #[test]
    fn test_refused_connection_translates_via_reason_code() {
        let error = ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized);
        assert!(matches!(
            translate_connection_error(&error),
            ConnectError::AuthFailure { .. }
        ));
    }
}
