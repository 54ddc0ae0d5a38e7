//! Safe/idle output configuration.
//!
//! [`SafeStatePolicy`] turns the channel table into the fixed list of writes
//! that leaves the apparatus at rest. It is applied at startup, on abort and
//! at the end of every run. Applying it twice yields the same outputs as
//! applying it once.
//!
//! Write order follows the wiring convention: PWM channels that go to zero,
//! then PWM channels with a resting duty, then digital outputs LOW. Inputs
//! and continuously-driven channels are never written.

use tracing::error;

use crate::channel::{ChannelKind, ChannelTable, IdleTarget};
use crate::error::SequenceError;
use crate::sequence::{ChannelWrite, OutputValue};
use crate::traits::{ChannelId, HardwarePort, Level};

/// Table-driven idle configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeStatePolicy {
    writes: Vec<ChannelWrite>,
}

impl SafeStatePolicy {
    /// Derive the idle writes from a channel table.
    pub fn from_table(table: &ChannelTable) -> Self {
        let zero = table
            .iter()
            .filter(|c| c.kind == ChannelKind::PwmOut && c.idle == IdleTarget::Zero)
            .map(|c| ChannelWrite::pwm(c.id, 0));

        let resting = table.iter().filter_map(|c| match (c.kind, c.idle) {
            (ChannelKind::PwmOut, IdleTarget::Resting(duty)) => Some(ChannelWrite::pwm(c.id, duty)),
            _ => None,
        });

        let low = table
            .iter()
            .filter(|c| c.kind == ChannelKind::DigitalOut && c.idle == IdleTarget::Low)
            .map(|c| ChannelWrite::digital(c.id, Level::Low));

        Self {
            writes: zero.chain(resting).chain(low).collect(),
        }
    }

    /// The writes this policy performs, in order.
    pub fn plan(&self) -> &[ChannelWrite] {
        &self.writes
    }

    /// Drive every managed channel to its idle value.
    ///
    /// Every write is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub fn apply<P: HardwarePort>(&self, port: &mut P) -> Result<(), SequenceError> {
        let mut first_err = None;
        for write in &self.writes {
            if let Err(err) = write.apply(port) {
                error!(channel = %write.channel, error = %err, "failed to reach safe state");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Idle value for a channel, if the policy manages it.
    pub fn idle_value(&self, channel: ChannelId) -> Option<OutputValue> {
        self.writes
            .iter()
            .find(|w| w.channel == channel)
            .map(|w| w.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelRole, ChannelSpec};
    use crate::hal::MockPort;

    fn policy() -> SafeStatePolicy {
        SafeStatePolicy::from_table(&ChannelTable::wiring_default())
    }

    #[test]
    fn plan_matches_wiring_order() {
        let plan: Vec<_> = policy().plan().to_vec();
        assert_eq!(
            plan,
            vec![
                ChannelWrite::pwm(ChannelId(0), 0),
                ChannelWrite::pwm(ChannelId(7), 0),
                ChannelWrite::pwm(ChannelId(1), 0),
                ChannelWrite::pwm(ChannelId(12), 0),
                ChannelWrite::pwm(ChannelId(13), 0),
                ChannelWrite::pwm(ChannelId(3), 18),
                ChannelWrite::digital(ChannelId(14), Level::Low),
            ]
        );
    }

    #[test]
    fn inputs_are_not_written() {
        let policy = policy();
        assert_eq!(policy.idle_value(ChannelId(2)), None);
        assert_eq!(policy.idle_value(ChannelId(15)), None);
        assert_eq!(policy.idle_value(ChannelId(16)), None);
    }

    #[test]
    fn continuously_driven_channel_is_left_alone() {
        let table = ChannelTable::new(vec![
            ChannelSpec::continuous(1, "blower", 50),
            ChannelSpec::pwm(3, "valve", ChannelRole::ValveServo, IdleTarget::Resting(18)),
        ])
        .unwrap();
        let policy = SafeStatePolicy::from_table(&table);

        let mut port = MockPort::new();
        port.preset_pwm(ChannelId(1), 50);
        policy.apply(&mut port).unwrap();

        assert_eq!(port.duty(ChannelId(1)), Some(50));
        assert_eq!(port.duty(ChannelId(3)), Some(18));
    }

    #[test]
    fn apply_drives_outputs_idle() {
        let mut port = MockPort::new();
        port.preset_pwm(ChannelId(0), 100);
        port.preset_pwm(ChannelId(3), 5);
        port.preset_level(ChannelId(14), Level::High);

        policy().apply(&mut port).unwrap();

        assert_eq!(port.duty(ChannelId(0)), Some(0));
        assert_eq!(port.duty(ChannelId(3)), Some(18));
        assert_eq!(port.level(ChannelId(14)), Some(Level::Low));
    }

    #[test]
    fn apply_is_idempotent() {
        let policy = policy();
        let mut port = MockPort::new();
        port.preset_pwm(ChannelId(12), 100);

        policy.apply(&mut port).unwrap();
        let once = port.snapshot();
        policy.apply(&mut port).unwrap();
        assert_eq!(port.snapshot(), once);
    }

    #[test]
    fn apply_attempts_every_write_after_failure() {
        let policy = policy();
        let mut port = MockPort::new();
        port.fail_writes_to(ChannelId(0));
        port.preset_pwm(ChannelId(13), 100);

        let err = policy.apply(&mut port).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::Hardware {
                channel: ChannelId(0),
                ..
            }
        ));
        assert_eq!(port.duty(ChannelId(13)), Some(0));
        assert_eq!(port.level(ChannelId(14)), Some(Level::Low));
    }
}
