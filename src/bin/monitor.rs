//! Topic monitor: connects to the configured broker, subscribes to the
//! configured topics and prints every message that arrives. Doubles as a
//! minimal embedding example for the supervisor cycle.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use mqttlink::{
    default_config_path, ConnectionSupervisor, EventQueue, MqttConfig, RumqttTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config()?;
    if config.host.is_empty() {
        return Err(eyre!(
            "no broker host configured, edit the configuration file and restart"
        ));
    }

    let queue = Arc::new(EventQueue::new());
    let transport = RumqttTransport::new(Arc::clone(&queue))?;
    let mut supervisor = ConnectionSupervisor::new(config.clone(), Box::new(transport), queue)?;

    for topic in &config.subscribe_topics {
        supervisor.register(
            topic.clone(),
            Arc::new(|topic: &str, payload: &str| {
                println!("{topic}: {payload}");
            }),
        );
    }

    info!(host = %config.host, port = config.port, "starting monitor");
    supervisor.connect();

    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut last = Instant::now();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                supervisor.run_cycle(last.elapsed());
                last = Instant::now();
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("shutting down");
    supervisor.disconnect();
    // A few more cycles let the graceful disconnect reach the broker.
    for _ in 0..10 {
        supervisor.run_cycle(last.elapsed());
        last = Instant::now();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
    Ok(())
}

/// Reads the configuration named on the command line, falling back to the
/// default location. A missing file is replaced with a template so the first
/// run leaves something to edit.
fn load_config() -> Result<MqttConfig> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(default_config_path)
        .ok_or_else(|| eyre!("no configuration path available"))?;

    if !path.exists() {
        MqttConfig::default().save(&path)?;
        warn!(path = %path.display(), "wrote a template configuration");
    }

    Ok(MqttConfig::load(&path)?)
}
