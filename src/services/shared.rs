//! Execution guard and shared sequencer state for all control services.
//!
//! `SharedSequencer` owns the hardware port, the wash cycle, the safe-state
//! policy and the cancellation signal. The HTTP surface and the physical
//! stop button share one instance through `Arc`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rs_washcycle::config::{Config, CycleConfig};
//! use rs_washcycle::hal::MockPort;
//! use rs_washcycle::services::{SharedSequencer, StartOutcome};
//! use rs_washcycle::ChannelId;
//!
//! let mut port = MockPort::new();
//! port.input_high_after(ChannelId(2), 0);
//! port.input_high_after(ChannelId(15), 0);
//!
//! let config = Config::default().with_cycle(
//!     CycleConfig::default()
//!         .with_step_delay_ms(1)
//!         .with_limit_settle_ms(1)
//!         .with_drain_settle_ms(1),
//! );
//! let sequencer = Arc::new(SharedSequencer::initialize(port, &config).unwrap());
//!
//! assert!(matches!(sequencer.try_start().unwrap(), StartOutcome::Granted { .. }));
//! assert!(sequencer.wait_idle(Duration::from_secs(5)));
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::cycle::wash_cycle;
use crate::error::SequenceError;
use crate::safe_state::SafeStatePolicy;
use crate::sequence::{lock_port, RunReport, RunTiming, Sequence, SequenceRunner};
use crate::traits::HardwarePort;

// ============================================================================
// Sequence Provider Trait
// ============================================================================

/// Result of a start attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run was launched.
    Granted {
        /// Number assigned to the run.
        run_id: u64,
    },
    /// A run is already active. Nothing changed.
    Rejected,
}

/// Result of an abort request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortOutcome {
    /// A run was active; it will observe the signal at its next check.
    Signalled,
    /// No run was active; the safe state was applied before returning.
    Idled,
}

/// Trait for the start/abort operations exposed to control services.
///
/// This abstraction lets the HTTP handler and stop button work against the
/// real sequencer or a test double.
pub trait SequenceProvider: Send + Sync {
    /// Launch a run unless one is already active. Never waits for a run.
    fn try_start(&self) -> Result<StartOutcome, SequenceError>;

    /// Set the cancellation signal. Idles the outputs if no run is active.
    fn abort(&self) -> Result<AbortOutcome, SequenceError>;

    /// Non-blocking read of the running indicator.
    fn is_running(&self) -> bool;
}

// ============================================================================
// Shared Sequencer
// ============================================================================

#[derive(Debug, Default)]
struct GuardState {
    running: bool,
}

/// Single-flight sequencer shared by every control service.
///
/// # Locking
///
/// - `guard` serializes start and abort. It is held only for the decision
///   and, on an idle abort, for the safe-state writes. Never across a run.
/// - `port` is locked per write batch or per input read, never across a
///   sleep, so an abort is never blocked behind a dwell.
/// - `running` mirrors the guard for lock-free reads.
pub struct SharedSequencer<P: HardwarePort> {
    port: Mutex<P>,
    sequence: Sequence,
    policy: SafeStatePolicy,
    timing: RunTiming,
    cancel: CancelSignal,
    guard: Mutex<GuardState>,
    running: AtomicBool,
    runs_started: AtomicU64,
    last_report: Mutex<Option<RunReport>>,
}

impl<P: HardwarePort> SharedSequencer<P> {
    /// Create a sequencer from parts. The port is used as-is; no setup runs.
    pub fn new(port: P, sequence: Sequence, policy: SafeStatePolicy, timing: RunTiming) -> Self {
        Self {
            port: Mutex::new(port),
            sequence,
            policy,
            timing,
            cancel: CancelSignal::new(),
            guard: Mutex::new(GuardState::default()),
            running: AtomicBool::new(false),
            runs_started: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    /// Bring the apparatus up from configuration.
    ///
    /// Builds the wash cycle, runs port setup and applies the safe state.
    /// Any failure here is fatal: the control surface must not start.
    pub fn initialize(mut port: P, config: &Config) -> Result<Self, SequenceError> {
        let sequence = wash_cycle(&config.channels, &config.cycle)?;
        let policy = SafeStatePolicy::from_table(&config.channels);

        port.setup(&config.channels)
            .map_err(|e| SequenceError::Setup(Box::new(e)))?;
        policy.apply(&mut port)?;

        info!(
            channels = config.channels.len(),
            steps = sequence.len(),
            "hardware initialized, outputs idle"
        );
        Ok(Self::new(port, sequence, policy, config.sequence.timing()))
    }

    /// Launch a run on its own thread unless one is active.
    ///
    /// Returns as soon as the thread is spawned.
    pub fn try_start(self: &Arc<Self>) -> Result<StartOutcome, SequenceError>
    where
        P: 'static,
    {
        let mut guard = self.lock_guard();
        if guard.running {
            warn!("start rejected, sequence already running");
            return Ok(StartOutcome::Rejected);
        }

        let run_id = self.runs_started.fetch_add(1, Ordering::SeqCst) + 1;
        guard.running = true;
        self.running.store(true, Ordering::SeqCst);
        self.cancel.reset();

        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("wash-run-{run_id}"))
            .spawn(move || this.run(run_id));

        match spawned {
            Ok(_) => {
                info!(run = run_id, "sequence started");
                Ok(StartOutcome::Granted { run_id })
            }
            Err(err) => {
                guard.running = false;
                self.running.store(false, Ordering::SeqCst);
                error!(run = run_id, error = %err, "could not spawn run thread");
                Err(SequenceError::Spawn(err))
            }
        }
    }

    /// Set the cancellation signal; idle the outputs if nothing is running.
    ///
    /// Never waits for an active run to finish.
    pub fn abort(&self) -> Result<AbortOutcome, SequenceError> {
        let guard = self.lock_guard();
        self.cancel.cancel();

        if guard.running {
            info!("emergency stop signalled to active run");
            return Ok(AbortOutcome::Signalled);
        }

        // Held across the writes so a start cannot interleave with them.
        self.policy.apply(&mut *lock_port(&self.port))?;
        info!("emergency stop with no active run, outputs idle");
        drop(guard);
        Ok(AbortOutcome::Idled)
    }

    /// Whether a run is active.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Poll until no run is active or `timeout` passes.
    ///
    /// Returns `true` if idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.timing.poll_interval);
        }
        true
    }

    /// Access the port with the lock held.
    ///
    /// The closure pattern keeps the lock from leaking past the call.
    pub fn with_port<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut P) -> R,
    {
        let mut port = lock_port(&self.port);
        f(&mut *port)
    }

    /// Report of the most recent finished run.
    pub fn last_report(&self) -> Option<RunReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of runs granted since startup.
    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::SeqCst)
    }

    /// Handle to the cancellation signal.
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// The cycle this sequencer runs.
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// The idle configuration applied on every exit path.
    pub fn policy(&self) -> &SafeStatePolicy {
        &self.policy
    }

    fn run(&self, run_id: u64) {
        let _permit = RunPermit { sequencer: self };
        let report =
            SequenceRunner::new(&self.port, &self.sequence, &self.policy, &self.cancel, self.timing)
                .execute(run_id);
        info!(
            run = run_id,
            outcome = report.outcome.as_str(),
            steps = report.steps_entered,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );
        *self
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(report);
    }

    fn lock_guard(&self) -> MutexGuard<'_, GuardState> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Released when the run thread returns, including by panic.
struct RunPermit<'a, P: HardwarePort> {
    sequencer: &'a SharedSequencer<P>,
}

impl<P: HardwarePort> Drop for RunPermit<'_, P> {
    fn drop(&mut self) {
        let s = self.sequencer;
        if thread::panicking() {
            error!("run thread panicked, forcing safe state");
            let _ = s.policy.apply(&mut *lock_port(&s.port));
        }

        let mut guard = s.lock_guard();
        s.cancel.reset();
        guard.running = false;
        s.running.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// SequenceProvider Implementation for Arc<SharedSequencer>
// ============================================================================

impl<P: HardwarePort + 'static> SequenceProvider for Arc<SharedSequencer<P>> {
    fn try_start(&self) -> Result<StartOutcome, SequenceError> {
        SharedSequencer::try_start(self)
    }

    fn abort(&self) -> Result<AbortOutcome, SequenceError> {
        SharedSequencer::abort(self)
    }

    fn is_running(&self) -> bool {
        SharedSequencer::is_running(self)
    }
}
