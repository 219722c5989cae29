//! Connection supervisor.
//!
//! Owns one logical broker session: the connect/disconnect/reconnect state
//! machine, the birth and will announcements, and the fan-out of inbound
//! messages to the topic dispatcher. The host drives it with
//! [`run_cycle`](ConnectionSupervisor::run_cycle) once per tick; everything
//! the transport reports in between is parked on the notification queue and
//! applied at the start of the next cycle, so supervisor state is only ever
//! touched from the cycle-driving thread.

use crate::config::{ConfigError, MqttConfig, QosLevel};
use crate::dispatcher::{ObserverHandle, TopicDispatcher};
use crate::transport::{DisconnectMode, EventQueue, Transport, TransportEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of the supervised broker session.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Counters and state snapshot a host can poll for display.
#[derive(Clone, Debug, Default)]
pub struct SupervisorStatus {
    pub state: ConnectionState,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

/// Errors raised while constructing a supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Invalid settings. Reported once here; a supervisor is never built in a
    /// half-usable state.
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

/// Supervises one broker connection over an injected [`Transport`].
///
/// The caller expresses intent through the desired-connected flag; the
/// transport reports truth through queue events. Each cycle reconciles the
/// two: flag edges trigger exactly one connect or disconnect request, and a
/// fixed-interval timer retries while the caller wants a connection the
/// transport cannot hold.
pub struct ConnectionSupervisor {
    config: MqttConfig,
    transport: Box<dyn Transport>,
    queue: Arc<EventQueue>,
    dispatcher: TopicDispatcher,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    /// What the caller wants, set at any time between cycles.
    desired: bool,
    /// The desired value acted on last cycle; edges fire requests.
    reconciled: bool,
    /// What the transport last reported.
    actual: bool,
    reconnect_timer: Duration,
    messages_received: usize,
    messages_sent: usize,
    last_activity: Option<chrono::DateTime<chrono::Local>>,
}

impl ConnectionSupervisor {
    /// Builds a supervisor over `transport`, which must push its events onto
    /// `queue`. An empty client id is replaced with a generated one so
    /// reconnects reuse a stable identity.
    pub fn new(
        mut config: MqttConfig,
        transport: Box<dyn Transport>,
        queue: Arc<EventQueue>,
    ) -> Result<Self, SupervisorError> {
        config.validate()?;
        if config.client_id.is_empty() {
            config.client_id = format!("mqttlink-{}", Uuid::new_v4());
            debug!(client_id = %config.client_id, "generated client identifier");
        }
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            config,
            transport,
            queue,
            dispatcher: TopicDispatcher::new(),
            state: ConnectionState::Disconnected,
            state_tx,
            desired: false,
            reconciled: false,
            actual: false,
            reconnect_timer: Duration::ZERO,
            messages_received: 0,
            messages_sent: 0,
            last_activity: None,
        })
    }

    /// Requests a connection. Idempotent; redundant calls are absorbed.
    pub fn connect(&mut self) {
        self.set_desired_connected(true);
    }

    /// Requests a graceful disconnect. Idempotent.
    pub fn disconnect(&mut self) {
        self.set_desired_connected(false);
    }

    /// Records caller intent. Acted on (edge-triggered) by the next cycle,
    /// which reads the final value, so rapid toggling inside one cycle
    /// produces no network traffic.
    pub fn set_desired_connected(&mut self, desired: bool) {
        self.desired = desired;
    }

    pub fn desired_connected(&self) -> bool {
        self.desired
    }

    /// Connection truth as last reported by the transport.
    pub fn actual_connected(&self) -> bool {
        self.actual
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Watch channel mirroring every state transition, for host tasks that
    /// would rather await changes than poll.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            state: self.state,
            messages_received: self.messages_received,
            messages_sent: self.messages_sent,
            last_activity: self.last_activity,
        }
    }

    /// Registers `observer` for messages on exactly `topic`.
    pub fn register(&mut self, topic: impl Into<String>, observer: ObserverHandle) {
        self.dispatcher.register(topic, observer);
    }

    /// Removes `observer` from `topic`; unknown pairs are tolerated.
    pub fn unregister(&mut self, topic: &str, observer: &ObserverHandle) {
        self.dispatcher.unregister(topic, observer);
    }

    /// Publishes to the broker. Dropped with a warning while disconnected.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QosLevel, retain: bool) {
        if self.state == ConnectionState::Disconnected {
            warn!(topic, "publish while disconnected, dropping");
            return;
        }
        self.transport.publish(topic, payload, qos, retain);
        self.messages_sent += 1;
        self.last_activity = Some(chrono::Local::now());
    }

    /// Subscribes at the broker. Dropped with a warning while disconnected;
    /// topics meant to survive reconnects belong in the configuration's
    /// subscribe set instead.
    pub fn subscribe(&mut self, topic: &str, qos: QosLevel) {
        if self.state == ConnectionState::Disconnected {
            warn!(topic, "subscribe while disconnected, dropping");
            return;
        }
        self.transport.subscribe(topic, qos);
    }

    /// Removes a broker subscription. Dropped with a warning while
    /// disconnected.
    pub fn unsubscribe(&mut self, topic: &str) {
        if self.state == ConnectionState::Disconnected {
            warn!(topic, "unsubscribe while disconnected, dropping");
            return;
        }
        self.transport.unsubscribe(topic);
    }

    /// The single driving tick. Drains queued transport events, reconciles
    /// the desired flag against transport truth, then advances the reconnect
    /// timer by `elapsed`. Never blocks; work is bounded by the number of
    /// queued events plus one state check.
    pub fn run_cycle(&mut self, elapsed: Duration) {
        let events = self.queue.drain();
        for event in events {
            self.apply(event);
        }

        if self.desired != self.reconciled {
            self.reconciled = self.desired;
            if self.desired {
                self.request_connect();
            } else {
                self.request_disconnect();
            }
        }

        let interval = self.config.reconnect_interval();
        if !interval.is_zero() && self.desired && !self.actual {
            self.reconnect_timer += elapsed;
            if self.reconnect_timer >= interval {
                self.reconnect_timer = Duration::ZERO;
                debug!("reconnect interval elapsed");
                self.request_connect();
            }
        }
    }

    /// Applies one transport event. Transitions are idempotent so a stale or
    /// duplicated notification cannot corrupt state.
    fn apply(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                self.actual = true;
                self.set_state(ConnectionState::Connected);
                info!(host = %self.config.host, "connected");
                if self.config.birth.enabled() {
                    let birth = &self.config.birth;
                    self.transport
                        .publish(&birth.topic, birth.payload.as_bytes(), birth.qos, birth.retain);
                    self.messages_sent += 1;
                }
                for topic in &self.config.subscribe_topics {
                    self.transport.subscribe(topic, self.config.subscribe_qos);
                }
            }
            TransportEvent::Disconnected => {
                if self.actual || self.state != ConnectionState::Disconnected {
                    info!(host = %self.config.host, "disconnected");
                }
                self.actual = false;
                self.set_state(ConnectionState::Disconnected);
            }
            TransportEvent::Message(message) => {
                self.messages_received += 1;
                self.last_activity = Some(chrono::Local::now());
                self.dispatcher.dispatch(&message);
            }
        }
    }

    fn request_connect(&mut self) {
        // One connect request in flight at a time; the attempt either
        // succeeds or surfaces as a Disconnected event, clearing this state.
        if self.state == ConnectionState::Connecting {
            debug!("connect already in flight");
            return;
        }
        info!(host = %self.config.host, port = self.config.port, "connecting");
        self.set_state(ConnectionState::Connecting);
        self.transport.connect(&self.config);
    }

    fn request_disconnect(&mut self) {
        let mode = if self.config.will.enabled() && self.config.will.send_on_disconnect {
            DisconnectMode::PublishWill
        } else {
            DisconnectMode::Normal
        };
        info!(host = %self.config.host, ?mode, "disconnecting");
        self.transport.disconnect(mode);
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "state transition");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if self.actual {
            self.request_disconnect();
        }
    }
}
