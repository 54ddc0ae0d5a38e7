//! Control services: the HTTP run/stop surface and the physical stop button.
//!
//! All services share one [`SharedSequencer`] wrapped in `Arc`. Start and
//! abort go through its execution guard, so the HTTP surface and the stop
//! button never race each other or the run thread.
//!
//! ```ignore
//! use std::sync::Arc;
//! use rs_washcycle::services::{build_router, SharedSequencer};
//!
//! let sequencer = Arc::new(SharedSequencer::initialize(port, &config)?);
//! let router = build_router(Arc::clone(&sequencer));
//! ```

pub mod shared;

// HTTP handler logic (independent of the server front end)
pub mod http_handler;

pub mod web;

pub mod physical;

// Re-exports
pub use shared::*;

pub use http_handler::*;

pub use web::*;

pub use physical::*;
