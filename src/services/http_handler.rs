//! Control surface request handling, independent of the HTTP server.
//!
//! `ControlHandler` maps the two control operations onto a
//! [`SequenceProvider`] and returns a [`ControlResponse`] carrying the status
//! code and plain-text body. The axum router in [`super::web`] only wires
//! paths to these methods.
//!
//! | Request | Condition | Status | Body |
//! |---------|-----------|--------|------|
//! | `GET /run` | idle | 200 | `Sequence started.` |
//! | `GET /run` | running | 409 | `Sequence already running.` |
//! | `GET /stop` | any | 200 | `Emergency stop activated.` |
//! | anything else | | 404 | `Not found.` |
//!
//! # Example
//!
//! ```ignore
//! use rs_washcycle::services::ControlHandler;
//!
//! let handler = ControlHandler::new(Arc::clone(&sequencer));
//! let response = handler.handle_run();
//! assert_eq!(response.status(), 200);
//! ```

use tracing::{error, info};

use super::shared::{AbortOutcome, SequenceProvider, StartOutcome};

// ============================================================================
// Response Type
// ============================================================================

/// Status and body of a control response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlResponse {
    status: u16,
    body: &'static str,
}

impl ControlResponse {
    /// 200, run launched.
    pub const STARTED: Self = Self::new(200, "Sequence started.\n");
    /// 409, a run is already active.
    pub const ALREADY_RUNNING: Self = Self::new(409, "Sequence already running.\n");
    /// 200, cancellation signal set.
    pub const STOPPED: Self = Self::new(200, "Emergency stop activated.\n");
    /// 404, unknown path or method.
    pub const NOT_FOUND: Self = Self::new(404, "Not found.\n");
    /// 500, the run thread could not be launched.
    pub const START_FAILED: Self = Self::new(500, "Sequence could not be started.\n");
    /// 500, the idle writes failed on an abort with no active run.
    pub const SAFE_STATE_FAILED: Self =
        Self::new(500, "Emergency stop activated. Safe state not reached.\n");

    const fn new(status: u16, body: &'static str) -> Self {
        Self { status, body }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Plain-text body, newline terminated.
    pub fn body(&self) -> &'static str {
        self.body
    }

    /// Check if this is a success response.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

// Axum integration: allow ControlResponse to be returned directly from handlers
#[cfg(feature = "web")]
impl axum::response::IntoResponse for ControlResponse {
    fn into_response(self) -> axum::response::Response {
        use axum::http::{header, StatusCode};

        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::CONNECTION, "close"),
            ],
            self.body,
        )
            .into_response()
    }
}

// ============================================================================
// Control Handler
// ============================================================================

/// Start/stop request logic shared by every server front end.
#[derive(Clone, Debug)]
pub struct ControlHandler<S: SequenceProvider> {
    provider: S,
}

impl<S: SequenceProvider> ControlHandler<S> {
    /// Create a handler over the given provider.
    pub fn new(provider: S) -> Self {
        Self { provider }
    }

    /// GET /run - start a run unless one is active.
    ///
    /// Responds before the run does any work.
    pub fn handle_run(&self) -> ControlResponse {
        match self.provider.try_start() {
            Ok(StartOutcome::Granted { run_id }) => {
                info!(run = run_id, "run requested");
                ControlResponse::STARTED
            }
            Ok(StartOutcome::Rejected) => ControlResponse::ALREADY_RUNNING,
            Err(err) => {
                error!(error = %err, "run request failed");
                ControlResponse::START_FAILED
            }
        }
    }

    /// GET /stop - set the cancellation signal.
    ///
    /// Never waits for an active run to stop. With no run active the outputs
    /// are idle before this returns.
    pub fn handle_stop(&self) -> ControlResponse {
        match self.provider.abort() {
            Ok(AbortOutcome::Signalled) | Ok(AbortOutcome::Idled) => ControlResponse::STOPPED,
            Err(err) => {
                error!(error = %err, "emergency stop could not reach safe state");
                ControlResponse::SAFE_STATE_FAILED
            }
        }
    }

    /// Any other request.
    pub fn handle_not_found(&self) -> ControlResponse {
        ControlResponse::NOT_FOUND
    }

    /// The underlying provider.
    pub fn provider(&self) -> &S {
        &self.provider
    }
}
