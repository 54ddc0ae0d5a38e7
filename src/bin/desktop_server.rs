//! Desktop wash cycle server backed by a simulated port.
//!
//! Runs the full control surface against [`MockPort`], with the limit
//! switches tripping after a fixed number of polls, so the cycle and the
//! HTTP interface can be exercised without the apparatus.
//!
//! ```bash
//! cargo run --features server --bin desktop_server -- --port 8080
//! curl http://localhost:8080/run
//! curl http://localhost:8080/stop
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rs_washcycle::hal::MockPort;
use rs_washcycle::services::{
    run_server_with_state, InputStopButton, SharedSequencer, StopButtonHandler, WebServerConfig,
};
use rs_washcycle::{ChannelKind, Config};

/// Wash cycle control server
#[derive(Parser)]
#[command(name = "desktop_server")]
#[command(about = "Wash cycle sequencer with a simulated hardware port", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path (.toml or .json)
    #[arg(short, long, env = "WASHCYCLE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides the config file)
    #[arg(short, long, env = "WASHCYCLE_PORT")]
    port: Option<u16>,

    /// Polls before each simulated limit switch trips
    #[arg(long, env = "WASHCYCLE_LIMIT_POLLS", default_value_t = 200)]
    limit_polls: u32,

    /// Log level
    #[arg(long, env = "WASHCYCLE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "WASHCYCLE_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // =========================================================================
    // Configuration
    // =========================================================================
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.web.port = port;
    }

    // =========================================================================
    // Hardware
    // =========================================================================
    let mut port = MockPort::new();
    for spec in config.channels.iter() {
        if spec.kind == ChannelKind::DigitalIn && Some(spec.id) != config.channels.stop_button() {
            port.input_high_after(spec.id, cli.limit_polls);
        }
    }

    let sequencer = Arc::new(
        SharedSequencer::initialize(port, &config).context("hardware initialization failed")?,
    );
    info!(device = %config.device.name, "outputs idle, ready");

    // =========================================================================
    // Stop Button
    // =========================================================================
    if config.sequence.stop_button_enabled {
        match config.channels.stop_button() {
            Some(channel) => {
                let button = InputStopButton::new(Arc::clone(&sequencer), channel);
                let mut handler = StopButtonHandler::new(Arc::clone(&sequencer), button);
                let interval = Duration::from_millis(config.sequence.stop_button_poll_ms.max(1));
                thread::Builder::new()
                    .name("stop-button".into())
                    .spawn(move || loop {
                        handler.poll();
                        thread::sleep(interval);
                    })
                    .context("spawning stop button watcher")?;
                info!(%channel, "stop button watcher running");
            }
            None => warn!("stop button enabled but no stop_button channel is wired"),
        }
    }

    // =========================================================================
    // Control Surface
    // =========================================================================
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    run_server_with_state(
        Arc::clone(&sequencer),
        WebServerConfig::from_config(&config.web),
        shutdown,
    )
    .await
    .context("control surface failed")?;

    info!("shutting down, stopping any active run");
    sequencer.abort().context("safe state not reached at shutdown")?;
    if !sequencer.wait_idle(Duration::from_secs(5)) {
        warn!("run did not stop within 5s");
    }
    Ok(())
}
