//! Broker connection configuration.
//!
//! All settings the [`ConnectionSupervisor`](crate::supervisor::ConnectionSupervisor)
//! reads each cycle: broker address and transport, credentials, session flags,
//! timers, the subscribe-topic set and the birth/will announcements. The whole
//! tree is serde-derived so a host application can persist it as TOML;
//! [`MqttConfig::load`] and [`MqttConfig::save`] default to the user config
//! directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors produced while loading, storing or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Rejected settings. Reported once at setup, never per cycle.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How the connection reaches the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Plain TCP.
    #[default]
    Tcp,
    /// TCP with TLS. Requires [`MqttConfig::ca_certificate`].
    Tls,
    /// Websocket (`ws://host:port/path`).
    Ws,
    /// Websocket over TLS. Requires [`MqttConfig::ca_certificate`].
    Wss,
}

/// MQTT delivery-guarantee level.
///
/// The integer mapping (0/1/2, anything else treated as 0) is the single
/// shared conversion; transport adapters translate this enum into whatever
/// their protocol library expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum QosLevel {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<u8> for QosLevel {
    fn from(level: u8) -> Self {
        match level {
            1 => QosLevel::AtLeastOnce,
            2 => QosLevel::ExactlyOnce,
            _ => QosLevel::AtMostOnce,
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> Self {
        match qos {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

/// Message published right after a successful connect, announcing presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BirthMessage {
    pub topic: String,
    pub payload: String,
    pub qos: QosLevel,
    pub retain: bool,
}

impl Default for BirthMessage {
    fn default() -> Self {
        Self {
            topic: String::new(),
            payload: "Online".to_string(),
            qos: QosLevel::AtMostOnce,
            retain: true,
        }
    }
}

impl BirthMessage {
    /// A birth is announced only when both topic and payload are set.
    pub fn enabled(&self) -> bool {
        !self.topic.is_empty() && !self.payload.is_empty()
    }
}

/// Message the broker publishes on behalf of the client when the
/// connection drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WillMessage {
    pub topic: String,
    pub payload: String,
    pub qos: QosLevel,
    pub retain: bool,
    /// Deliver the will on a graceful disconnect too, instead of only on
    /// connection loss. On by default; set to `false` to suppress.
    pub send_on_disconnect: bool,
}

impl Default for WillMessage {
    fn default() -> Self {
        Self {
            topic: String::new(),
            payload: "Offline".to_string(),
            qos: QosLevel::AtMostOnce,
            retain: true,
            send_on_disconnect: true,
        }
    }
}

impl WillMessage {
    /// A will is registered only when both topic and payload are set.
    pub fn enabled(&self) -> bool {
        !self.topic.is_empty() && !self.payload.is_empty()
    }
}

/// Full configuration of one logical broker session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Client identifier. Left empty, the supervisor substitutes a random one.
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub transport: TransportMode,
    /// Path component for websocket transports.
    pub websocket_path: String,
    /// PEM CA certificate used to verify the broker on TLS transports.
    pub ca_certificate: Option<PathBuf>,
    /// Username for authentication; empty means anonymous.
    pub username: String,
    pub password: String,
    /// Discard prior session state (subscriptions, queued messages) on connect.
    pub clean_session: bool,
    pub connect_timeout_secs: u64,
    /// Fixed retry interval while the caller wants a connection the transport
    /// cannot provide. `0` disables automatic reconnection.
    pub reconnect_secs: u64,
    pub keep_alive_secs: u64,
    /// Topics subscribed after every successful connect.
    pub subscribe_topics: Vec<String>,
    /// QoS applied to all configured subscriptions.
    pub subscribe_qos: QosLevel,
    pub birth: BirthMessage,
    pub will: WillMessage,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            host: String::new(),
            port: 1883,
            transport: TransportMode::Tcp,
            websocket_path: "/mqtt".to_string(),
            ca_certificate: None,
            username: String::new(),
            password: String::new(),
            clean_session: true,
            connect_timeout_secs: 3,
            reconnect_secs: 5,
            keep_alive_secs: 5,
            subscribe_topics: Vec::new(),
            subscribe_qos: QosLevel::AtMostOnce,
            birth: BirthMessage::default(),
            will: WillMessage::default(),
        }
    }
}

impl MqttConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Checks the settings a supervisor cannot operate without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("broker host is empty".to_string()));
        }
        if matches!(self.transport, TransportMode::Tls | TransportMode::Wss)
            && self.ca_certificate.is_none()
        {
            return Err(ConfigError::Invalid(
                "TLS transport selected but no CA certificate configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Reads a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        debug!(path = %path.display(), "loaded mqtt configuration");
        Ok(config)
    }

    /// Writes the configuration as TOML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        fs::write(path, raw)?;
        debug!(path = %path.display(), "saved mqtt configuration");
        Ok(())
    }
}

/// Default on-disk location for the configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mqttlink").join("config.toml"))
}
