//! Axum-based HTTP server for the control surface.
//!
//! Provides:
//! - GET `/run` - Start the wash cycle (409 if already running)
//! - GET `/stop` - Emergency stop
//!
//! Every other path or method gets 404, HEAD included. Responses are plain text and the
//! connection is closed after each one.

use std::future::Future;
use std::net::SocketAddr;

use axum::{extract::State, routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WebConfig;

use super::http_handler::{ControlHandler, ControlResponse};
use super::shared::SequenceProvider;

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /run
async fn run<S: SequenceProvider + Clone>(
    State(handler): State<ControlHandler<S>>,
) -> ControlResponse {
    handler.handle_run()
}

/// GET /stop
async fn stop<S: SequenceProvider + Clone>(
    State(handler): State<ControlHandler<S>>,
) -> ControlResponse {
    handler.handle_stop()
}

/// Fallback handler for 404
async fn not_found() -> ControlResponse {
    ControlResponse::NOT_FOUND
}

// ============================================================================
// Server Builder
// ============================================================================

/// Configuration for the web server
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self::from_config(&WebConfig::default())
    }
}

impl WebServerConfig {
    /// Create a new config with the given address
    pub fn new(addr: impl Into<SocketAddr>) -> Self {
        Self { addr: addr.into() }
    }

    /// Create from shared WebConfig
    pub fn from_config(config: &WebConfig) -> Self {
        Self {
            addr: config.socket_addr(),
        }
    }
}

/// Build the Axum router with all routes
pub fn build_router<S>(provider: S) -> Router
where
    S: SequenceProvider + Clone + 'static,
{
    Router::new()
        // `get` also answers HEAD unless a HEAD handler is registered.
        .route("/run", get(run::<S>).head(not_found).fallback(not_found))
        .route("/stop", get(stop::<S>).head(not_found).fallback(not_found))
        .fallback(not_found)
        .with_state(ControlHandler::new(provider))
        .layer(TraceLayer::new_for_http())
}

/// Start the web server with shared state
///
/// Runs until `shutdown` resolves.
///
/// # Example
///
/// ```ignore
/// let sequencer = Arc::new(SharedSequencer::initialize(port, &config)?);
/// run_server_with_state(
///     Arc::clone(&sequencer),
///     WebServerConfig::from_config(&config.web),
///     async { let _ = tokio::signal::ctrl_c().await; },
/// )
/// .await?;
/// ```
pub async fn run_server_with_state<S, F>(
    provider: S,
    config: WebServerConfig,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    S: SequenceProvider + Clone + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = build_router(provider);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "control surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_config_uses_port_8080() {
        let config = WebServerConfig::default();
        assert_eq!(config.addr.port(), 8080);
        assert!(config.addr.ip().is_unspecified());
    }

    #[test]
    fn server_config_from_web_config() {
        let web = WebConfig::default().with_port(9001);
        assert_eq!(WebServerConfig::from_config(&web).addr.port(), 9001);
    }

    #[test]
    fn server_config_new() {
        let config = WebServerConfig::new(([127, 0, 0, 1], 3000));
        assert_eq!(config.addr.to_string(), "127.0.0.1:3000");
    }
}
