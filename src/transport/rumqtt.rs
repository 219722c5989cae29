//! Native transport adapter on top of rumqttc.
//!
//! Each connect attempt builds a fresh `AsyncClient`/`EventLoop` pair and
//! spawns one task that pumps the event loop, translating protocol events
//! into [`TransportEvent`]s. The task ends on any connection error instead of
//! letting rumqttc reconnect on its own; retry policy belongs to the
//! supervisor.

use super::{DisconnectMode, EventQueue, Transport, TransportError, TransportEvent};
use crate::config::{ConfigError, MqttConfig, QosLevel, TransportMode, WillMessage};
use crate::message::MqttMessage;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill, MqttOptions,
    Packet, QoS, TlsConfiguration, Transport as WireTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// rumqttc-backed [`Transport`].
pub struct RumqttTransport {
    queue: Arc<EventQueue>,
    runtime: Handle,
    client: Option<AsyncClient>,
    /// Will settings of the active session, kept for graceful delivery.
    will: Option<WillMessage>,
    /// Cancels the event-loop task of a superseded connect attempt.
    cancel: Option<CancellationToken>,
}

impl RumqttTransport {
    /// Builds the adapter. Fails when no tokio runtime is available to host
    /// the event-loop task; that is a setup error, reported once.
    pub fn new(queue: Arc<EventQueue>) -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|e| TransportError::Runtime(e.to_string()))?;
        Ok(Self {
            queue,
            runtime,
            client: None,
            will: None,
            cancel: None,
        })
    }
}

impl Transport for RumqttTransport {
    fn connect(&mut self, config: &MqttConfig) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        let options = match build_options(config) {
            Ok(options) => options,
            Err(e) => {
                error!(error = %e, "cannot build mqtt options");
                self.queue.push(TransportEvent::Disconnected);
                return;
            }
        };

        let (client, event_loop) = AsyncClient::new(options, 100);
        self.client = Some(client);
        self.will = config.will.enabled().then(|| config.will.clone());

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        let queue = Arc::clone(&self.queue);
        let connect_timeout = config.connect_timeout();
        debug!(host = %config.host, port = config.port, "starting connect attempt");
        self.runtime.spawn(async move {
            drive_event_loop(event_loop, queue, connect_timeout, cancel).await;
        });
    }

    fn disconnect(&mut self, mode: DisconnectMode) {
        let Some(client) = self.client.take() else {
            debug!("disconnect requested without an active client");
            return;
        };
        if mode == DisconnectMode::PublishWill {
            if let Some(will) = &self.will {
                // The v4 DISCONNECT packet cannot ask the broker to fire the
                // will, so the client delivers it itself before leaving.
                if let Err(e) = client.try_publish(
                    will.topic.as_str(),
                    wire_qos(will.qos),
                    will.retain,
                    will.payload.clone().into_bytes(),
                ) {
                    warn!(error = %e, "failed to publish will before disconnect");
                }
            }
        }
        if let Err(e) = client.try_disconnect() {
            debug!(error = %e, "disconnect request not accepted");
        }
        // The event-loop task observes the closing connection and reports
        // Disconnected through the queue.
    }

    fn publish(&mut self, topic: &str, payload: &[u8], qos: QosLevel, retain: bool) {
        let Some(client) = &self.client else {
            warn!(topic, "publish requested without an active connection");
            return;
        };
        if let Err(e) = client.try_publish(topic, wire_qos(qos), retain, payload.to_vec()) {
            warn!(topic, error = %e, "publish request not accepted");
        }
    }

    fn subscribe(&mut self, topic: &str, qos: QosLevel) {
        let Some(client) = &self.client else {
            warn!(topic, "subscribe requested without an active connection");
            return;
        };
        if let Err(e) = client.try_subscribe(topic, wire_qos(qos)) {
            warn!(topic, error = %e, "subscribe request not accepted");
        }
    }

    fn unsubscribe(&mut self, topic: &str) {
        let Some(client) = &self.client else {
            warn!(topic, "unsubscribe requested without an active connection");
            return;
        };
        if let Err(e) = client.try_unsubscribe(topic) {
            warn!(topic, error = %e, "unsubscribe request not accepted");
        }
    }
}

/// Pumps one connection's event loop until it dies or is superseded.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    queue: Arc<EventQueue>,
    connect_timeout: Duration,
    cancel: CancellationToken,
) {
    let mut connected = false;
    let deadline = Instant::now() + connect_timeout;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("event loop superseded by a newer connect attempt");
                return;
            }
            event = poll_next(&mut event_loop, connected, deadline) => event,
        };
        match event {
            Some(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected = true;
                    queue.push(TransportEvent::Connected);
                } else {
                    warn!(code = ?ack.code, "broker rejected connection");
                    queue.push(TransportEvent::Disconnected);
                    return;
                }
            }
            Some(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                queue.push(TransportEvent::Message(MqttMessage::from_bytes(
                    publish.topic,
                    publish.payload.to_vec(),
                )));
            }
            Some(Ok(Event::Incoming(Packet::Disconnect))) => {
                queue.push(TransportEvent::Disconnected);
                return;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(error = %e, "event loop closed");
                queue.push(TransportEvent::Disconnected);
                return;
            }
            None => {
                // No ConnAck inside the configured window. Indistinguishable
                // from any other transport failure for the supervisor.
                warn!("connect attempt timed out");
                queue.push(TransportEvent::Disconnected);
                return;
            }
        }
    }
}

/// Polls the event loop; before the session is up, the poll races the
/// connect deadline and `None` signals a timeout.
async fn poll_next(
    event_loop: &mut EventLoop,
    connected: bool,
    deadline: Instant,
) -> Option<Result<Event, ConnectionError>> {
    if connected {
        Some(event_loop.poll().await)
    } else {
        tokio::time::timeout_at(deadline, event_loop.poll()).await.ok()
    }
}

/// Maps configuration onto rumqttc options.
fn build_options(config: &MqttConfig) -> Result<MqttOptions, ConfigError> {
    let mut options = match config.transport {
        TransportMode::Tcp => {
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port)
        }
        TransportMode::Tls => {
            let mut options =
                MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
            options.set_transport(WireTransport::Tls(tls_configuration(config)?));
            options
        }
        TransportMode::Ws => {
            let url = format!(
                "ws://{}:{}{}",
                config.host, config.port, config.websocket_path
            );
            let mut options = MqttOptions::new(config.client_id.clone(), url, config.port);
            options.set_transport(WireTransport::Ws);
            options
        }
        TransportMode::Wss => {
            let url = format!(
                "wss://{}:{}{}",
                config.host, config.port, config.websocket_path
            );
            let mut options = MqttOptions::new(config.client_id.clone(), url, config.port);
            options.set_transport(WireTransport::Wss(tls_configuration(config)?));
            options
        }
    };

    options
        .set_keep_alive(config.keep_alive())
        .set_clean_session(config.clean_session);
    if !config.username.is_empty() {
        options.set_credentials(config.username.clone(), config.password.clone());
    }
    if config.will.enabled() {
        let will = &config.will;
        options.set_last_will(LastWill::new(
            will.topic.clone(),
            will.payload.clone().into_bytes(),
            wire_qos(will.qos),
            will.retain,
        ));
    }
    Ok(options)
}

fn tls_configuration(config: &MqttConfig) -> Result<TlsConfiguration, ConfigError> {
    let path = config.ca_certificate.as_ref().ok_or_else(|| {
        ConfigError::Invalid("TLS transport selected but no CA certificate configured".to_string())
    })?;
    let ca = std::fs::read(path)?;
    Ok(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: None,
    })
}

fn wire_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_qos_covers_all_levels() {
        assert_eq!(wire_qos(QosLevel::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(wire_qos(QosLevel::AtLeastOnce), QoS::AtLeastOnce);
        assert_eq!(wire_qos(QosLevel::ExactlyOnce), QoS::ExactlyOnce);
    }

    #[test]
    fn tls_without_ca_is_rejected() {
        let config = MqttConfig {
            host: "broker.local".to_string(),
            transport: TransportMode::Tls,
            ..MqttConfig::default()
        };
        assert!(tls_configuration(&config).is_err());
    }

    #[test]
    fn tcp_options_carry_host_and_client_id() {
        let config = MqttConfig {
            client_id: "bench-rig".to_string(),
            host: "broker.local".to_string(),
            port: 1884,
            ..MqttConfig::default()
        };
        let options = build_options(&config).unwrap();
        assert_eq!(
            options.broker_address(),
            ("broker.local".to_string(), 1884)
        );
        assert_eq!(options.client_id(), "bench-rig");
    }

    #[test]
    fn websocket_options_use_a_full_url() {
        let config = MqttConfig {
            client_id: "bench-rig".to_string(),
            host: "broker.local".to_string(),
            port: 9001,
            transport: TransportMode::Ws,
            ..MqttConfig::default()
        };
        let options = build_options(&config).unwrap();
        assert_eq!(
            options.broker_address().0,
            "ws://broker.local:9001/mqtt"
        );
    }
}
