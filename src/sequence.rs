//! Sequence state machine.
//!
//! A [`Sequence`] is an ordered, immutable list of [`Step`]s. Each step
//! applies its channel writes in declaration order, then optionally waits on
//! a limit switch or dwells for a fixed time. [`SequenceRunner::execute`]
//! walks the steps strictly in order, checks the [`CancelSignal`] before
//! every step and at every poll interval inside a wait, and applies the
//! safe-state policy exactly once on the way out regardless of outcome.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Mutex;
//! use std::time::Duration;
//! use rs_washcycle::cancel::CancelSignal;
//! use rs_washcycle::hal::MockPort;
//! use rs_washcycle::safe_state::SafeStatePolicy;
//! use rs_washcycle::sequence::{
//!     ChannelWrite, RunOutcome, RunTiming, Sequence, SequenceRunner, Step, WaitCondition,
//! };
//! use rs_washcycle::{ChannelId, ChannelTable};
//!
//! let table = ChannelTable::wiring_default();
//! let steps = Sequence::new(vec![
//!     Step::new("winch lower", &[ChannelWrite::pwm(ChannelId(1), 40)],
//!         Some(WaitCondition::Dwell(Duration::from_millis(5)))).unwrap(),
//! ]);
//! let port = Mutex::new(MockPort::new());
//! let policy = SafeStatePolicy::from_table(&table);
//! let cancel = CancelSignal::new();
//!
//! let report = SequenceRunner::new(&port, &steps, &policy, &cancel, RunTiming::default())
//!     .execute(1);
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! assert_eq!(port.lock().unwrap().duty(ChannelId(1)), Some(0));
//! ```

use core::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use heapless::String as HString;
use heapless::Vec as HVec;
use tracing::{error, info, warn};

use crate::cancel::CancelSignal;
use crate::error::{ConfigError, SequenceError};
use crate::safe_state::SafeStatePolicy;
use crate::traits::{ChannelId, HardwarePort, Level};

/// Maximum length of a step label.
pub const MAX_LABEL: usize = 32;

/// Maximum number of channel writes in one step.
pub const MAX_STEP_WRITES: usize = 8;

/// Step label.
pub type Label = HString<MAX_LABEL>;

/// Create a label from a &str, truncating at a UTF-8 boundary if too long.
pub fn label(s: &str) -> Label {
    let mut out = Label::new();
    let valid_end = s
        .char_indices()
        .take_while(|(i, c)| i + c.len_utf8() <= MAX_LABEL)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let _ = out.push_str(&s[..valid_end]);
    out
}

// ============================================================================
// Channel Writes
// ============================================================================

/// Value written to a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputValue {
    /// Digital level.
    Digital(Level),
    /// PWM duty as a percentage.
    Pwm(u8),
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValue::Digital(level) => f.write_str(level.as_str()),
            OutputValue::Pwm(duty) => write!(f, "{duty}%"),
        }
    }
}

/// One output write performed on step entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelWrite {
    /// Target channel.
    pub channel: ChannelId,
    /// Value to write.
    pub value: OutputValue,
}

impl ChannelWrite {
    /// PWM duty write.
    pub const fn pwm(channel: ChannelId, duty: u8) -> Self {
        Self {
            channel,
            value: OutputValue::Pwm(duty),
        }
    }

    /// Digital level write.
    pub const fn digital(channel: ChannelId, level: Level) -> Self {
        Self {
            channel,
            value: OutputValue::Digital(level),
        }
    }

    /// Send this write through the port.
    pub fn apply<P: HardwarePort>(&self, port: &mut P) -> Result<(), SequenceError> {
        let result = match self.value {
            OutputValue::Digital(level) => port.write_digital(self.channel, level),
            OutputValue::Pwm(duty) => port.write_pwm(self.channel, duty),
        };
        result.map_err(|e| SequenceError::hardware(self.channel, e))
    }
}

// ============================================================================
// Steps
// ============================================================================

/// What a step waits for after its writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitCondition {
    /// Poll a digital input until it reads HIGH.
    Input(ChannelId),
    /// Sleep for a fixed time, interruptible at the poll interval.
    Dwell(Duration),
}

/// Ordered unit of the sequence. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    label: Label,
    writes: HVec<ChannelWrite, MAX_STEP_WRITES>,
    wait: Option<WaitCondition>,
}

impl Step {
    /// Build a step. Fails if `writes` exceeds [`MAX_STEP_WRITES`].
    pub fn new(
        name: &str,
        writes: &[ChannelWrite],
        wait: Option<WaitCondition>,
    ) -> Result<Self, ConfigError> {
        let writes =
            HVec::from_slice(writes).map_err(|_| ConfigError::TooManyWrites(name.into()))?;
        Ok(Self {
            label: label(name),
            writes,
            wait,
        })
    }

    /// Human-readable label.
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Writes applied on entry, in order.
    pub fn writes(&self) -> &[ChannelWrite] {
        &self.writes
    }

    /// Wait condition, if any.
    pub fn wait(&self) -> Option<WaitCondition> {
        self.wait
    }
}

/// Fixed, ordered list of steps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sequence {
    steps: Vec<Step>,
}

impl Sequence {
    /// Wrap an ordered step list.
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step ran and every wait resolved.
    Completed,
    /// The cancellation signal was observed while at `step`.
    Aborted {
        /// Index of the step that was interrupted or about to start.
        step: usize,
    },
    /// A hardware error or limit timeout stopped the run at `step`.
    Faulted {
        /// Index of the failing step.
        step: usize,
        /// Error description.
        reason: String,
    },
}

impl RunOutcome {
    /// Short name for logs and status output.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Aborted { .. } => "aborted",
            RunOutcome::Faulted { .. } => "faulted",
        }
    }
}

/// Summary of one finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Monotonic run number assigned by the guard.
    pub run_id: u64,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Number of steps whose writes were applied.
    pub steps_entered: usize,
    /// Wall time from first step to safe state.
    pub elapsed: Duration,
    /// Whether the final safe-state application succeeded.
    pub safe_state_reached: bool,
}

/// Polling parameters for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunTiming {
    /// Interval between limit-switch polls and cancellation checks.
    pub poll_interval: Duration,
    /// Give up waiting on a limit switch after this long. `None` waits forever.
    pub limit_timeout: Option<Duration>,
}

impl Default for RunTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            limit_timeout: None,
        }
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Lock the port, recovering from a poisoned mutex.
///
/// A panicking writer must not make the safe state unreachable.
pub(crate) fn lock_port<P>(port: &Mutex<P>) -> MutexGuard<'_, P> {
    port.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Stop {
    Cancelled,
    Fault(SequenceError),
}

/// Executes a [`Sequence`] against a hardware port.
pub struct SequenceRunner<'a, P: HardwarePort> {
    port: &'a Mutex<P>,
    sequence: &'a Sequence,
    policy: &'a SafeStatePolicy,
    cancel: &'a CancelSignal,
    timing: RunTiming,
}

impl<'a, P: HardwarePort> SequenceRunner<'a, P> {
    /// Create a runner borrowing the shared collaborators.
    pub fn new(
        port: &'a Mutex<P>,
        sequence: &'a Sequence,
        policy: &'a SafeStatePolicy,
        cancel: &'a CancelSignal,
        timing: RunTiming,
    ) -> Self {
        Self {
            port,
            sequence,
            policy,
            cancel,
            timing,
        }
    }

    /// Run every step in order, then apply the safe state once.
    ///
    /// Blocks the calling thread until the run completes, aborts or faults.
    pub fn execute(&self, run_id: u64) -> RunReport {
        let started = Instant::now();
        let mut steps_entered = 0;

        let outcome = match self.run_steps(run_id, &mut steps_entered) {
            Ok(()) => RunOutcome::Completed,
            Err((step, Stop::Cancelled)) => RunOutcome::Aborted { step },
            Err((step, Stop::Fault(err))) => RunOutcome::Faulted {
                step,
                reason: err.to_string(),
            },
        };

        let safe_state_reached = match self.policy.apply(&mut *lock_port(self.port)) {
            Ok(()) => true,
            Err(err) => {
                error!(run = run_id, error = %err, "safe state not fully applied");
                false
            }
        };

        match &outcome {
            RunOutcome::Completed => info!(run = run_id, "sequence complete"),
            RunOutcome::Aborted { step } => {
                warn!(run = run_id, step, "emergency stop triggered, sequence aborted")
            }
            RunOutcome::Faulted { step, reason } => {
                error!(run = run_id, step, %reason, "sequence faulted")
            }
        }

        RunReport {
            run_id,
            outcome,
            steps_entered,
            elapsed: started.elapsed(),
            safe_state_reached,
        }
    }

    fn run_steps(&self, run_id: u64, entered: &mut usize) -> Result<(), (usize, Stop)> {
        for (index, step) in self.sequence.steps().iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err((index, Stop::Cancelled));
            }

            info!(run = run_id, step = index + 1, label = step.label(), "entering step");
            self.apply_writes(step).map_err(|e| (index, Stop::Fault(e)))?;
            *entered += 1;

            match step.wait() {
                None => {}
                Some(WaitCondition::Dwell(duration)) => {
                    if !self.cancel.wait(duration, self.timing.poll_interval) {
                        return Err((index, Stop::Cancelled));
                    }
                }
                Some(WaitCondition::Input(channel)) => {
                    self.wait_for_input(channel).map_err(|s| (index, s))?;
                    info!(run = run_id, step = index + 1, %channel, "limit reached");
                }
            }
        }
        Ok(())
    }

    fn apply_writes(&self, step: &Step) -> Result<(), SequenceError> {
        let mut port = lock_port(self.port);
        for write in step.writes() {
            write.apply(&mut *port)?;
        }
        Ok(())
    }

    fn wait_for_input(&self, channel: ChannelId) -> Result<(), Stop> {
        let started = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }

            let level = lock_port(self.port)
                .read_digital(channel)
                .map_err(|e| Stop::Fault(SequenceError::hardware(channel, e)))?;
            if level.is_high() {
                return Ok(());
            }

            if let Some(timeout) = self.timing.limit_timeout {
                if started.elapsed() >= timeout {
                    return Err(Stop::Fault(SequenceError::LimitTimeout {
                        channel,
                        timeout_ms: timeout.as_millis() as u64,
                    }));
                }
            }

            thread::sleep(self.timing.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelTable;
    use crate::hal::MockPort;

    const ARM: ChannelId = ChannelId(0);
    const VALVE: ChannelId = ChannelId(3);
    const PUMP: ChannelId = ChannelId(14);
    const LIMIT: ChannelId = ChannelId(2);

    fn timing() -> RunTiming {
        RunTiming {
            poll_interval: Duration::from_millis(1),
            limit_timeout: None,
        }
    }

    fn policy() -> SafeStatePolicy {
        SafeStatePolicy::from_table(&ChannelTable::wiring_default())
    }

    fn dwell(ms: u64) -> Option<WaitCondition> {
        Some(WaitCondition::Dwell(Duration::from_millis(ms)))
    }

    // =========================================================================
    // Label / Step Tests
    // =========================================================================

    #[test]
    fn label_truncates_long_names() {
        let long = "x".repeat(100);
        assert_eq!(label(&long).len(), MAX_LABEL);
    }

    #[test]
    fn label_respects_utf8_boundaries() {
        let input = "撹拌".repeat(10);
        let l = label(&input);
        assert!(l.len() <= MAX_LABEL);
        assert!(core::str::from_utf8(l.as_bytes()).is_ok());
    }

    #[test]
    fn step_rejects_too_many_writes() {
        let writes = [ChannelWrite::pwm(ARM, 1); MAX_STEP_WRITES + 1];
        assert!(matches!(
            Step::new("crowded", &writes, None),
            Err(ConfigError::TooManyWrites(_))
        ));
    }

    #[test]
    fn output_value_display() {
        assert_eq!(OutputValue::Pwm(50).to_string(), "50%");
        assert_eq!(OutputValue::Digital(Level::High).to_string(), "high");
    }

    // =========================================================================
    // Execution Tests
    // =========================================================================

    #[test]
    fn completed_run_applies_writes_in_order_then_idles() {
        let seq = Sequence::new(vec![
            Step::new(
                "start",
                &[ChannelWrite::pwm(ARM, 100), ChannelWrite::pwm(ARM, 50)],
                dwell(1),
            )
            .unwrap(),
            Step::new("pump", &[ChannelWrite::digital(PUMP, Level::High)], None).unwrap(),
        ]);
        let port = Mutex::new(MockPort::new());
        let policy = policy();
        let cancel = CancelSignal::new();

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(7);

        assert_eq!(report.run_id, 7);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.steps_entered, 2);
        assert!(report.safe_state_reached);

        let port = port.lock().unwrap();
        assert_eq!(
            &port.history()[..3],
            &[
                ChannelWrite::pwm(ARM, 100),
                ChannelWrite::pwm(ARM, 50),
                ChannelWrite::digital(PUMP, Level::High),
            ]
        );
        assert_eq!(&port.history()[3..], policy.plan());
    }

    #[test]
    fn waits_for_limit_switch() {
        let seq = Sequence::new(vec![
            Step::new("arm", &[ChannelWrite::pwm(ARM, 100)], Some(WaitCondition::Input(LIMIT)))
                .unwrap(),
        ]);
        let mut mock = MockPort::new();
        mock.input_high_after(LIMIT, 5);
        let port = Mutex::new(mock);
        let policy = policy();
        let cancel = CancelSignal::new();

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(1);

        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(port.lock().unwrap().read_count(LIMIT), 6);
    }

    #[test]
    fn pre_cancelled_run_applies_no_step_writes() {
        let seq = Sequence::new(vec![
            Step::new("arm", &[ChannelWrite::pwm(ARM, 100)], None).unwrap(),
        ]);
        let port = Mutex::new(MockPort::new());
        let policy = policy();
        let cancel = CancelSignal::new();
        cancel.cancel();

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(1);

        assert_eq!(report.outcome, RunOutcome::Aborted { step: 0 });
        assert_eq!(report.steps_entered, 0);
        assert_eq!(port.lock().unwrap().history(), policy.plan());
    }

    #[test]
    fn cancel_during_limit_wait_aborts() {
        let seq = Sequence::new(vec![
            Step::new("arm", &[ChannelWrite::pwm(ARM, 100)], Some(WaitCondition::Input(LIMIT)))
                .unwrap(),
            Step::new("valve", &[ChannelWrite::pwm(VALVE, 5)], None).unwrap(),
        ]);
        let port = Mutex::new(MockPort::new());
        let policy = policy();
        let cancel = CancelSignal::new();

        let remote = cancel.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(1);
        stopper.join().unwrap();

        assert_eq!(report.outcome, RunOutcome::Aborted { step: 0 });
        let port = port.lock().unwrap();
        assert!(!port.history().contains(&ChannelWrite::pwm(VALVE, 5)));
        assert_eq!(port.duty(VALVE), Some(18));
    }

    #[test]
    fn cancel_during_dwell_aborts_early() {
        let seq = Sequence::new(vec![
            Step::new("long", &[ChannelWrite::pwm(ARM, 100)], dwell(10_000)).unwrap(),
        ]);
        let port = Mutex::new(MockPort::new());
        let policy = policy();
        let cancel = CancelSignal::new();

        let remote = cancel.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(1);
        stopper.join().unwrap();

        assert_eq!(report.outcome, RunOutcome::Aborted { step: 0 });
        assert!(report.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn limit_timeout_faults_run() {
        let seq = Sequence::new(vec![
            Step::new("arm", &[ChannelWrite::pwm(ARM, 100)], Some(WaitCondition::Input(LIMIT)))
                .unwrap(),
        ]);
        let port = Mutex::new(MockPort::new());
        let policy = policy();
        let cancel = CancelSignal::new();
        let timing = RunTiming {
            poll_interval: Duration::from_millis(1),
            limit_timeout: Some(Duration::from_millis(10)),
        };

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing).execute(1);

        match report.outcome {
            RunOutcome::Faulted { step, reason } => {
                assert_eq!(step, 0);
                assert!(reason.contains("ch2"));
            }
            other => panic!("expected fault, got {other:?}"),
        }
        assert!(report.safe_state_reached);
        assert_eq!(port.lock().unwrap().duty(ARM), Some(0));
    }

    #[test]
    fn write_failure_faults_run_and_still_idles() {
        let seq = Sequence::new(vec![
            Step::new("pump", &[ChannelWrite::digital(PUMP, Level::High)], None).unwrap(),
            Step::new("arm", &[ChannelWrite::pwm(ARM, 100)], None).unwrap(),
        ]);
        let mut mock = MockPort::new();
        mock.fail_writes_to(PUMP);
        let port = Mutex::new(mock);
        let policy = policy();
        let cancel = CancelSignal::new();

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(1);

        assert!(matches!(report.outcome, RunOutcome::Faulted { step: 0, .. }));
        assert_eq!(report.steps_entered, 0);
        // The pump write fails again during safe state.
        assert!(!report.safe_state_reached);
        assert!(!port.lock().unwrap().history().contains(&ChannelWrite::pwm(ARM, 100)));
    }

    #[test]
    fn read_failure_faults_run() {
        let seq = Sequence::new(vec![
            Step::new("arm", &[], Some(WaitCondition::Input(LIMIT))).unwrap(),
        ]);
        let mut mock = MockPort::new();
        mock.fail_reads_from(LIMIT);
        let port = Mutex::new(mock);
        let policy = policy();
        let cancel = CancelSignal::new();

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(1);
        assert!(matches!(report.outcome, RunOutcome::Faulted { step: 0, .. }));
        assert!(report.safe_state_reached);
    }

    #[test]
    fn runner_does_not_reset_cancel_signal() {
        let seq = Sequence::default();
        let port = Mutex::new(MockPort::new());
        let policy = policy();
        let cancel = CancelSignal::new();
        cancel.cancel();

        let _ = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(1);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn empty_sequence_completes() {
        let seq = Sequence::default();
        let port = Mutex::new(MockPort::new());
        let policy = policy();
        let cancel = CancelSignal::new();

        let report = SequenceRunner::new(&port, &seq, &policy, &cancel, timing()).execute(1);
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(port.lock().unwrap().history(), policy.plan());
    }

    #[test]
    fn outcome_names() {
        assert_eq!(RunOutcome::Completed.as_str(), "completed");
        assert_eq!(RunOutcome::Aborted { step: 1 }.as_str(), "aborted");
        assert_eq!(
            RunOutcome::Faulted {
                step: 1,
                reason: String::new()
            }
            .as_str(),
            "faulted"
        );
    }
}
