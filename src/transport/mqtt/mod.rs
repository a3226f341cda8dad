//! MQTT broker transport built on rumqttc
//!
//! Split between pure connection/state types ([`connection`]), pure event
//! routing ([`events`]), and the session I/O ([`client`]).

pub mod client;
pub mod connection;
mod events;

pub use client::BrokerConnection;
pub use connection::{
    ConnectError, ConnectionLostEvent, ConnectionParameters, ConnectionState, SubscribeError,
    CONNECT_TIMEOUT, DEFAULT_PORT,
};
