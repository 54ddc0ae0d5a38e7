//! Mock implementations for testing without hardware.
//!
//! This module provides test doubles for the hardware traits, enabling
//! development and testing on desktop without the apparatus attached.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockPort`] | [`HardwarePort`] | Records writes, scripts inputs, injects failures |
//! | [`MockStopButton`] | [`StopButton`] | Queued button presses |
//!
//! # Example
//!
//! ```rust
//! use rs_washcycle::hal::MockPort;
//! use rs_washcycle::traits::{ChannelId, HardwarePort, Level};
//!
//! let mut port = MockPort::new();
//! port.write_pwm(ChannelId(0), 100).unwrap();
//! port.write_digital(ChannelId(14), Level::High).unwrap();
//!
//! assert_eq!(port.duty(ChannelId(0)), Some(100));
//! assert_eq!(port.level(ChannelId(14)), Some(Level::High));
//! assert_eq!(port.history().len(), 2);
//! ```
//!
//! [`HardwarePort`]: crate::traits::HardwarePort
//! [`StopButton`]: crate::traits::StopButton

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use crate::channel::ChannelTable;
use crate::sequence::{ChannelWrite, OutputValue};
use crate::traits::{ChannelId, HardwarePort, Level, StopButton, PWM_RANGE};

/// Failure injected into a [`MockPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MockPortError {
    /// Writes to this channel were set to fail.
    #[error("write rejected on {0}")]
    WriteRejected(ChannelId),
    /// Reads from this channel were set to fail.
    #[error("read rejected on {0}")]
    ReadRejected(ChannelId),
    /// Setup was set to fail.
    #[error("setup rejected")]
    SetupRejected,
}

#[derive(Debug, Clone, Copy)]
enum InputScript {
    Fixed(Level),
    /// LOW for `reads` reads, then HIGH once, then repeats.
    HighAfter { reads: u32, pending: u32 },
}

/// Mock hardware port for testing.
///
/// Keeps the last value written to every output, a log of all successful
/// writes, and a scripted level for every input.
///
/// # Example
///
/// ```rust
/// use rs_washcycle::hal::MockPort;
/// use rs_washcycle::traits::{ChannelId, HardwarePort, Level};
///
/// let mut port = MockPort::new();
/// port.input_high_after(ChannelId(2), 2);
///
/// assert_eq!(port.read_digital(ChannelId(2)).unwrap(), Level::Low);
/// assert_eq!(port.read_digital(ChannelId(2)).unwrap(), Level::Low);
/// assert_eq!(port.read_digital(ChannelId(2)).unwrap(), Level::High);
/// assert_eq!(port.read_count(ChannelId(2)), 3);
/// ```
#[derive(Debug, Default)]
pub struct MockPort {
    /// Whether `setup()` has been called.
    pub setup_called: bool,
    /// Number of channels in the table passed to `setup()`.
    pub setup_channels: usize,
    outputs: BTreeMap<ChannelId, OutputValue>,
    history: Vec<ChannelWrite>,
    inputs: HashMap<ChannelId, InputScript>,
    reads: HashMap<ChannelId, u32>,
    failing_writes: BTreeSet<ChannelId>,
    failing_reads: BTreeSet<ChannelId>,
    failing_setup: bool,
}

impl MockPort {
    /// Creates a new mock port with no outputs written and all inputs LOW.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current duty of a PWM channel, if it has been written.
    pub fn duty(&self, channel: ChannelId) -> Option<u8> {
        match self.outputs.get(&channel) {
            Some(OutputValue::Pwm(duty)) => Some(*duty),
            _ => None,
        }
    }

    /// Current level of a digital output, if it has been written.
    pub fn level(&self, channel: ChannelId) -> Option<Level> {
        match self.outputs.get(&channel) {
            Some(OutputValue::Digital(level)) => Some(*level),
            _ => None,
        }
    }

    /// Set a PWM output without recording it in the history.
    pub fn preset_pwm(&mut self, channel: ChannelId, duty: u8) {
        self.outputs.insert(channel, OutputValue::Pwm(duty));
    }

    /// Set a digital output without recording it in the history.
    pub fn preset_level(&mut self, channel: ChannelId, level: Level) {
        self.outputs.insert(channel, OutputValue::Digital(level));
    }

    /// Copy of every output's current value, ordered by channel.
    pub fn snapshot(&self) -> BTreeMap<ChannelId, OutputValue> {
        self.outputs.clone()
    }

    /// Successful writes in the order they were performed.
    pub fn history(&self) -> &[ChannelWrite] {
        &self.history
    }

    /// Fix an input at `level`.
    pub fn set_input(&mut self, channel: ChannelId, level: Level) {
        self.inputs.insert(channel, InputScript::Fixed(level));
    }

    /// Make an input read LOW `reads` times, then HIGH once.
    ///
    /// The pattern repeats, so a limit switch trips once per run.
    pub fn input_high_after(&mut self, channel: ChannelId, reads: u32) {
        self.inputs.insert(
            channel,
            InputScript::HighAfter {
                reads,
                pending: reads,
            },
        );
    }

    /// Total number of reads from `channel`.
    pub fn read_count(&self, channel: ChannelId) -> u32 {
        self.reads.get(&channel).copied().unwrap_or(0)
    }

    /// Make every write to `channel` fail.
    pub fn fail_writes_to(&mut self, channel: ChannelId) {
        self.failing_writes.insert(channel);
    }

    /// Make every read from `channel` fail.
    pub fn fail_reads_from(&mut self, channel: ChannelId) {
        self.failing_reads.insert(channel);
    }

    /// Make `setup()` fail.
    pub fn fail_setup(&mut self) {
        self.failing_setup = true;
    }

    /// Clear all injected failures.
    pub fn heal(&mut self) {
        self.failing_writes.clear();
        self.failing_reads.clear();
        self.failing_setup = false;
    }

    fn record(&mut self, write: ChannelWrite) -> Result<(), MockPortError> {
        if self.failing_writes.contains(&write.channel) {
            return Err(MockPortError::WriteRejected(write.channel));
        }
        self.outputs.insert(write.channel, write.value);
        self.history.push(write);
        Ok(())
    }
}

impl HardwarePort for MockPort {
    type Error = MockPortError;

    fn setup(&mut self, table: &ChannelTable) -> Result<(), MockPortError> {
        if self.failing_setup {
            return Err(MockPortError::SetupRejected);
        }
        self.setup_called = true;
        self.setup_channels = table.len();
        Ok(())
    }

    fn write_digital(&mut self, channel: ChannelId, level: Level) -> Result<(), MockPortError> {
        self.record(ChannelWrite::digital(channel, level))
    }

    fn read_digital(&mut self, channel: ChannelId) -> Result<Level, MockPortError> {
        *self.reads.entry(channel).or_default() += 1;
        if self.failing_reads.contains(&channel) {
            return Err(MockPortError::ReadRejected(channel));
        }

        let level = match self.inputs.get_mut(&channel) {
            None => Level::Low,
            Some(InputScript::Fixed(level)) => *level,
            Some(InputScript::HighAfter { reads, pending }) => {
                if *pending == 0 {
                    *pending = *reads;
                    Level::High
                } else {
                    *pending -= 1;
                    Level::Low
                }
            }
        };
        Ok(level)
    }

    fn write_pwm(&mut self, channel: ChannelId, duty: u8) -> Result<(), MockPortError> {
        self.record(ChannelWrite::pwm(channel, duty.min(PWM_RANGE)))
    }
}

/// Mock stop button for testing.
///
/// # Example
///
/// ```rust
/// use rs_washcycle::hal::MockStopButton;
/// use rs_washcycle::traits::StopButton;
///
/// let mut button = MockStopButton::new();
/// assert!(!button.just_pressed());
///
/// button.press();
/// assert!(button.just_pressed()); // Once
/// assert!(!button.just_pressed()); // Consumed
/// ```
#[derive(Debug, Default)]
pub struct MockStopButton {
    pending: usize,
    /// Number of times `just_pressed` was polled.
    pub poll_count: usize,
}

impl MockStopButton {
    /// Creates a new mock button with no pending presses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one press.
    pub fn press(&mut self) {
        self.pending += 1;
    }
}

impl StopButton for MockStopButton {
    fn just_pressed(&mut self) -> bool {
        self.poll_count += 1;
        if self.pending == 0 {
            return false;
        }
        self.pending -= 1;
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ARM: ChannelId = ChannelId(0);
    const PUMP: ChannelId = ChannelId(14);
    const LIMIT: ChannelId = ChannelId(2);

    // =========================================================================
    // MockPort Tests
    // =========================================================================

    #[test]
    fn mock_port_default() {
        let port = MockPort::new();
        assert!(!port.setup_called);
        assert!(port.history().is_empty());
        assert_eq!(port.duty(ARM), None);
        assert_eq!(port.level(PUMP), None);
    }

    #[test]
    fn mock_port_setup() {
        let mut port = MockPort::new();
        port.setup(&ChannelTable::wiring_default()).unwrap();
        assert!(port.setup_called);
        assert_eq!(port.setup_channels, 10);
    }

    #[test]
    fn mock_port_setup_failure() {
        let mut port = MockPort::new();
        port.fail_setup();
        assert_eq!(
            port.setup(&ChannelTable::wiring_default()),
            Err(MockPortError::SetupRejected)
        );
        assert!(!port.setup_called);
    }

    #[test]
    fn mock_port_records_writes() {
        let mut port = MockPort::new();
        port.write_pwm(ARM, 100).unwrap();
        port.write_digital(PUMP, Level::High).unwrap();
        port.write_pwm(ARM, 0).unwrap();

        assert_eq!(
            port.history(),
            &[
                ChannelWrite::pwm(ARM, 100),
                ChannelWrite::digital(PUMP, Level::High),
                ChannelWrite::pwm(ARM, 0),
            ]
        );
        assert_eq!(port.duty(ARM), Some(0));
    }

    #[test]
    fn mock_port_clamps_duty() {
        let mut port = MockPort::new();
        port.write_pwm(ARM, 250).unwrap();
        assert_eq!(port.duty(ARM), Some(PWM_RANGE));
    }

    #[test]
    fn mock_port_presets_are_not_history() {
        let mut port = MockPort::new();
        port.preset_pwm(ARM, 40);
        port.preset_level(PUMP, Level::High);
        assert!(port.history().is_empty());
        assert_eq!(port.duty(ARM), Some(40));
        assert_eq!(port.level(PUMP), Some(Level::High));
    }

    #[test]
    fn mock_port_duty_and_level_are_kind_specific() {
        let mut port = MockPort::new();
        port.preset_pwm(ARM, 40);
        assert_eq!(port.level(ARM), None);
    }

    #[test]
    fn mock_port_failed_write_leaves_state() {
        let mut port = MockPort::new();
        port.preset_level(PUMP, Level::High);
        port.fail_writes_to(PUMP);

        assert_eq!(
            port.write_digital(PUMP, Level::Low),
            Err(MockPortError::WriteRejected(PUMP))
        );
        assert_eq!(port.level(PUMP), Some(Level::High));
        assert!(port.history().is_empty());

        port.heal();
        port.write_digital(PUMP, Level::Low).unwrap();
        assert_eq!(port.level(PUMP), Some(Level::Low));
    }

    #[test]
    fn mock_port_inputs_default_low() {
        let mut port = MockPort::new();
        assert_eq!(port.read_digital(LIMIT).unwrap(), Level::Low);
        assert_eq!(port.read_count(LIMIT), 1);
    }

    #[test]
    fn mock_port_fixed_input() {
        let mut port = MockPort::new();
        port.set_input(LIMIT, Level::High);
        assert_eq!(port.read_digital(LIMIT).unwrap(), Level::High);
        assert_eq!(port.read_digital(LIMIT).unwrap(), Level::High);
    }

    #[test]
    fn mock_port_high_after_repeats() {
        let mut port = MockPort::new();
        port.input_high_after(LIMIT, 1);

        let levels: Vec<_> = (0..4).map(|_| port.read_digital(LIMIT).unwrap()).collect();
        assert_eq!(levels, [Level::Low, Level::High, Level::Low, Level::High]);
    }

    #[test]
    fn mock_port_read_failure_still_counts() {
        let mut port = MockPort::new();
        port.fail_reads_from(LIMIT);
        assert_eq!(
            port.read_digital(LIMIT),
            Err(MockPortError::ReadRejected(LIMIT))
        );
        assert_eq!(port.read_count(LIMIT), 1);
    }

    #[test]
    fn mock_port_error_display() {
        assert_eq!(
            MockPortError::WriteRejected(PUMP).to_string(),
            "write rejected on ch14"
        );
    }

    // =========================================================================
    // MockStopButton Tests
    // =========================================================================

    #[test]
    fn mock_stop_button_queues_presses() {
        let mut button = MockStopButton::new();
        button.press();
        button.press();

        assert!(button.just_pressed());
        assert!(button.just_pressed());
        assert!(!button.just_pressed());
        assert_eq!(button.poll_count, 3);
    }
}
