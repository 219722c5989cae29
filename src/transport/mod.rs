//! Transport adapter boundary.
//!
//! The supervisor never talks to an MQTT protocol library directly. It drives
//! a [`Transport`] implementation with fire-and-forget requests and learns
//! about outcomes through [`TransportEvent`]s on the shared queue. That keeps
//! the protocol library's threads out of supervisor state and lets tests run
//! against a recording stub instead of a broker.
//!
//! One real adapter ships with the crate: [`RumqttTransport`] on top of
//! rumqttc. A second implementation of the same trait is all it takes to back
//! the supervisor with a different client library.

pub mod rumqtt;

pub use rumqtt::RumqttTransport;

use crate::config::{MqttConfig, QosLevel};
use crate::message::MqttMessage;
use crate::queue::NotificationQueue;
use thiserror::Error;

/// Notifications a transport pushes onto the queue from its own threads.
#[derive(Debug)]
pub enum TransportEvent {
    /// The broker accepted the connection.
    Connected,
    /// The connection is gone: broker-initiated, network drop or connect
    /// timeout. All three look identical to the supervisor.
    Disconnected,
    /// An application message arrived on a subscribed topic.
    Message(MqttMessage),
}

/// Queue type shared between a supervisor and its transport.
pub type EventQueue = NotificationQueue<TransportEvent>;

/// How a requested disconnect should treat the registered will.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectMode {
    /// Plain disconnect; the broker discards the will.
    Normal,
    /// Deliver the will as part of the graceful disconnect.
    PublishWill,
}

/// Errors raised while constructing a transport. Anything after construction
/// is reported as a [`TransportEvent`] instead.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mqtt transport requires a running tokio runtime: {0}")]
    Runtime(String),
}

/// Capability set the supervisor is written against.
///
/// Every operation is a request: it must return without blocking, and its
/// outcome (if any) arrives later as a [`TransportEvent`]. Implementations
/// log failures instead of propagating them.
pub trait Transport: Send {
    /// Starts a connection attempt with the full configuration. A new attempt
    /// supersedes any earlier one still in flight.
    fn connect(&mut self, config: &MqttConfig);

    /// Tears the connection down gracefully.
    fn disconnect(&mut self, mode: DisconnectMode);

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QosLevel, retain: bool);

    fn subscribe(&mut self, topic: &str, qos: QosLevel);

    fn unsubscribe(&mut self, topic: &str);
}
