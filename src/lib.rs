//! # rs-washcycle
//!
//! Sequence controller for a multi-actuator wash apparatus (arm, winch,
//! stirrer, drain pump and metering valve), triggered and aborted over a
//! minimal HTTP run/stop interface.
//!
//! ## Features
//!
//! - **Single-flight runs**: one wash cycle at a time; a second start is rejected, never queued
//! - **Cooperative cancellation**: every wait checks the stop signal at the poll interval
//! - **Safe state on every exit**: startup, completion, abort and fault all end with idle outputs
//! - **Table-driven wiring**: channels, idle values and cycle calibration come from configuration
//! - **Hardware abstraction**: a small port trait, with a recording mock for desktop testing
//!
//! ## Architecture
//!
//! - `traits` - Hardware port and stop button abstractions
//! - `channel` - Channel table: kinds, roles and idle targets
//! - `safe_state` - Idle output policy derived from the channel table
//! - `cancel` - Shared cancellation signal with interruptible waits
//! - `sequence` - Step model and the run state machine
//! - `cycle` - The wash cycle step table
//! - `services` - Execution guard, HTTP control surface, stop button
//! - `hal` - Concrete port implementations (mock for testing)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rs_washcycle::{
//!     config::{Config, CycleConfig},
//!     hal::MockPort,
//!     services::{SharedSequencer, StartOutcome},
//!     ChannelId, RunOutcome,
//! };
//!
//! // Limit switches trip on the first poll
//! let mut port = MockPort::new();
//! port.input_high_after(ChannelId(2), 0);
//! port.input_high_after(ChannelId(15), 0);
//!
//! let config = Config::default().with_cycle(CycleConfig::default().with_step_delay_ms(1));
//! let sequencer = Arc::new(SharedSequencer::initialize(port, &config).unwrap());
//!
//! assert!(matches!(sequencer.try_start().unwrap(), StartOutcome::Granted { .. }));
//! assert_eq!(sequencer.try_start().unwrap(), StartOutcome::Rejected);
//!
//! assert!(sequencer.wait_idle(Duration::from_secs(5)));
//! assert_eq!(sequencer.last_report().unwrap().outcome, RunOutcome::Completed);
//! ```

#![warn(missing_docs)]

/// Shared cancellation signal.
pub mod cancel;
/// Channel table: wiring, kinds and idle targets.
pub mod channel;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Safe-state policy applied on every exit path.
pub mod safe_state;
/// Step model and the sequence state machine.
pub mod sequence;
/// Core traits for hardware abstraction.
pub mod traits;
/// The wash cycle step table.
pub mod cycle;

/// Configuration with defaults, TOML/JSON loading and builders.
pub mod config;

/// Error types.
pub mod error;

/// Control services: execution guard, HTTP surface, stop button (feature-gated).
#[cfg(feature = "web")]
pub mod services;

// Re-exports for convenience
pub use cancel::CancelSignal;
pub use channel::{ChannelKind, ChannelRole, ChannelSpec, ChannelTable, IdleTarget};
pub use cycle::wash_cycle;
pub use error::{ConfigError, SequenceError};
pub use safe_state::SafeStatePolicy;
pub use sequence::{
    ChannelWrite, OutputValue, RunOutcome, RunReport, RunTiming, Sequence, SequenceRunner, Step,
    WaitCondition,
};
pub use traits::{ChannelId, HardwarePort, Level, StopButton, PWM_RANGE};

// Config re-exports
pub use config::{Config, CycleConfig, DeviceConfig, SequenceConfig, WebConfig};
