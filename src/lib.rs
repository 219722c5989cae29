//! # mqttlink
//!
//! Embeddable MQTT connectivity layer: one supervised broker connection with
//! automatic reconnect, birth/last-will semantics and exact-topic fan-out of
//! inbound messages, driven by a host application's own tick.
//!
//! ## Module Architecture
//!
//! ```text
//! src/
//! ├── config.rs      - connection settings, TOML persistence
//! ├── message.rs     - topic/payload pairs with lazy binary/text views
//! ├── queue.rs       - cross-thread notification queue
//! ├── dispatcher.rs  - topic -> observer registry
//! ├── supervisor.rs  - connection state machine and cycle driver
//! └── transport/     - adapter trait + rumqttc implementation
//! ```
//!
//! ## Design Philosophy
//!
//! - **Single consumption point**: transport libraries report from their own
//!   tasks; every notification crosses the queue and is applied on the thread
//!   that calls `run_cycle`, so supervisor and dispatcher state need no locks.
//! - **Intent vs. truth**: the caller flips a desired-connected flag, the
//!   transport reports actual connectivity, and each cycle reconciles the two
//!   edge-triggered, so redundant requests never reach the network.
//! - **Transport behind a trait**: the supervisor is written against a small
//!   capability set, picked once at construction, so tests run against a
//!   recording stub and another client library is one impl away.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mqttlink::{ConnectionSupervisor, EventQueue, MqttConfig, RumqttTransport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MqttConfig {
//!     host: "broker.local".to_string(),
//!     subscribe_topics: vec!["sensors/temp".to_string()],
//!     ..MqttConfig::default()
//! };
//!
//! let queue = Arc::new(EventQueue::new());
//! let transport = RumqttTransport::new(Arc::clone(&queue))?;
//! let mut supervisor = ConnectionSupervisor::new(config, Box::new(transport), queue)?;
//!
//! supervisor.register("sensors/temp", Arc::new(|topic: &str, payload: &str| {
//!     println!("{topic}: {payload}");
//! }));
//! supervisor.connect();
//!
//! loop {
//!     supervisor.run_cycle(Duration::from_millis(50));
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//! }
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod message;
pub mod queue;
pub mod supervisor;
pub mod transport;

pub use config::{
    default_config_path, BirthMessage, ConfigError, MqttConfig, QosLevel, TransportMode,
    WillMessage,
};
pub use dispatcher::{ObserverHandle, TopicDispatcher, TopicObserver};
pub use message::{MessageError, MqttMessage};
pub use queue::NotificationQueue;
pub use supervisor::{ConnectionState, ConnectionSupervisor, SupervisorError, SupervisorStatus};
pub use transport::{
    DisconnectMode, EventQueue, RumqttTransport, Transport, TransportError, TransportEvent,
};
