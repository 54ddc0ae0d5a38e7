//! The wash cycle step table.
//!
//! Channels are resolved by name from the [`ChannelTable`] and duties and
//! timings come from [`CycleConfig`], so the step order lives here while the
//! calibration lives in configuration.

use std::time::Duration;

use crate::channel::{check_duty, ChannelKind, ChannelTable};
use crate::config::CycleConfig;
use crate::error::ConfigError;
use crate::sequence::{ChannelWrite, Sequence, Step, WaitCondition};
use crate::traits::Level;

/// Build the wash cycle for the given wiring and calibration.
///
/// | # | Step | Writes | Wait |
/// |---|------|--------|------|
/// | 1 | arm forward | arm_forward=full, arm_reverse=half | forward_limit |
/// | 2 | arm limit settle | - | limit settle |
/// | 3 | arm hold | arm_reverse=full | step delay |
/// | 4 | water injection | valve=fill | step delay |
/// | 5 | stirring | valve=lock, stirrer_a=full, stirrer_b=half | step delay + drain settle |
/// | 6 | drain | stirrer_b=full | - |
/// | 7 | winch lower | arm and stirrer off, winch=lower | step delay |
/// | 8 | pump out | winch=0, drain_pump=HIGH | step delay |
/// | 9 | winch raise | drain_pump=LOW, winch=raise | step delay |
/// | 10 | arm return | winch=0, arm_reverse=full, arm_forward=half | home_limit |
/// | 11 | arm home | arm_forward=full | - |
pub fn wash_cycle(table: &ChannelTable, cycle: &CycleConfig) -> Result<Sequence, ConfigError> {
    cycle.validate()?;

    let pwm = |name: &str| table.require(name, ChannelKind::PwmOut);
    let arm_fwd = pwm("arm_forward")?;
    let arm_rev = pwm("arm_reverse")?;
    let winch = pwm("winch")?;
    let valve = pwm("valve")?;
    let stir_a = pwm("stirrer_a")?;
    let stir_b = pwm("stirrer_b")?;
    let pump = table.require("drain_pump", ChannelKind::DigitalOut)?;
    let forward_limit = table.require("forward_limit", ChannelKind::DigitalIn)?;
    let home_limit = table.require("home_limit", ChannelKind::DigitalIn)?;

    let full = cycle.drive_full;
    let half = cycle.drive_half;
    let delay = Some(WaitCondition::Dwell(Duration::from_millis(cycle.step_delay_ms)));

    let steps = vec![
        Step::new(
            "arm forward",
            &[ChannelWrite::pwm(arm_fwd, full), ChannelWrite::pwm(arm_rev, half)],
            Some(WaitCondition::Input(forward_limit)),
        )?,
        Step::new(
            "arm limit settle",
            &[],
            Some(WaitCondition::Dwell(Duration::from_millis(cycle.limit_settle_ms))),
        )?,
        Step::new("arm hold", &[ChannelWrite::pwm(arm_rev, full)], delay)?,
        Step::new(
            "water injection",
            &[ChannelWrite::pwm(valve, cycle.valve_fill)],
            delay,
        )?,
        Step::new(
            "stirring",
            &[
                ChannelWrite::pwm(valve, cycle.valve_lock),
                ChannelWrite::pwm(stir_a, full),
                ChannelWrite::pwm(stir_b, half),
            ],
            Some(WaitCondition::Dwell(Duration::from_millis(
                cycle.step_delay_ms.saturating_add(cycle.drain_settle_ms),
            ))),
        )?,
        // Drain pulse: cut straight away by the winch-lower step.
        Step::new("drain", &[ChannelWrite::pwm(stir_b, full)], None)?,
        Step::new(
            "winch lower",
            &[
                ChannelWrite::pwm(arm_fwd, 0),
                ChannelWrite::pwm(arm_rev, 0),
                ChannelWrite::pwm(stir_a, 0),
                ChannelWrite::pwm(stir_b, 0),
                ChannelWrite::pwm(winch, cycle.winch_lower),
            ],
            delay,
        )?,
        Step::new(
            "pump out",
            &[
                ChannelWrite::pwm(winch, 0),
                ChannelWrite::digital(pump, Level::High),
            ],
            delay,
        )?,
        Step::new(
            "winch raise",
            &[
                ChannelWrite::digital(pump, Level::Low),
                ChannelWrite::pwm(winch, cycle.winch_raise),
            ],
            delay,
        )?,
        Step::new(
            "arm return",
            &[
                ChannelWrite::pwm(winch, 0),
                ChannelWrite::pwm(arm_rev, full),
                ChannelWrite::pwm(arm_fwd, half),
            ],
            Some(WaitCondition::Input(home_limit)),
        )?,
        Step::new("arm home", &[ChannelWrite::pwm(arm_fwd, full)], None)?,
    ];

    Ok(Sequence::new(steps))
}

impl CycleConfig {
    /// Check every calibrated duty against the PWM range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, duty) in [
            ("drive_full", self.drive_full),
            ("drive_half", self.drive_half),
            ("valve_fill", self.valve_fill),
            ("valve_lock", self.valve_lock),
            ("winch_lower", self.winch_lower),
            ("winch_raise", self.winch_raise),
        ] {
            check_duty(name, duty)?;
        }
        Ok(())
    }
}
