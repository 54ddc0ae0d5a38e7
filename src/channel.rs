//! Per-apparatus channel table.
//!
//! Every physical line the sequencer touches is declared here with its kind,
//! its role, and the value it must rest at when the apparatus is idle. The
//! safe-state policy and the cycle builder both read this table, so the
//! state machine itself never carries channel numbers or duties.
//!
//! # Default Wiring
//!
//! | id | name | kind | role | idle |
//! |----|------|------|------|------|
//! | 0 | `arm_forward` | PWM | arm drive | zero |
//! | 7 | `arm_reverse` | PWM | arm drive | zero |
//! | 1 | `winch` | PWM | winch drive | zero |
//! | 3 | `valve` | PWM | valve servo | resting 18% |
//! | 12 | `stirrer_a` | PWM | stirrer drive | zero |
//! | 13 | `stirrer_b` | PWM | stirrer drive | zero |
//! | 14 | `drain_pump` | digital out | pump out | low |
//! | 2 | `forward_limit` | digital in | limit switch | - |
//! | 15 | `home_limit` | digital in | limit switch | - |
//! | 16 | `stop_button` | digital in | stop button | - |

use core::fmt;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::traits::{ChannelId, PWM_RANGE};

/// Electrical kind of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Plain digital output.
    DigitalOut,
    /// Digital input (limit switches, buttons).
    DigitalIn,
    /// PWM-capable output.
    PwmOut,
}

impl ChannelKind {
    /// Human-readable name used in error messages.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::DigitalOut => "digital-out",
            ChannelKind::DigitalIn => "digital-in",
            ChannelKind::PwmOut => "pwm-out",
        }
    }
}

/// What a channel is wired to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// One half of the arm drive bridge.
    ArmDrive,
    /// Limit switch input.
    LimitSwitch,
    /// Metering valve / lock servo.
    ValveServo,
    /// Stirring motor drive.
    StirrerDrive,
    /// Drain pump enable.
    PumpOut,
    /// Winch motor drive.
    WinchDrive,
    /// Held at a constant duty for the whole process lifetime.
    ContinuouslyDriven,
    /// Physical emergency stop input.
    StopButton,
}

/// Value a channel rests at when the apparatus is idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleTarget {
    /// PWM duty 0.
    Zero,
    /// Non-zero holding duty (e.g. a servo lock that must not go slack).
    Resting(u8),
    /// Digital LOW.
    Low,
    /// Never written by the safe-state policy.
    Untouched,
}

impl fmt::Display for IdleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleTarget::Zero => f.write_str("zero"),
            IdleTarget::Resting(duty) => write!(f, "resting({duty})"),
            IdleTarget::Low => f.write_str("low"),
            IdleTarget::Untouched => f.write_str("untouched"),
        }
    }
}

/// One row of the channel table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Logical channel id passed to the hardware port.
    pub id: ChannelId,
    /// Unique name referenced by the cycle builder.
    pub name: String,
    /// Electrical kind.
    pub kind: ChannelKind,
    /// What the channel drives or senses.
    pub role: ChannelRole,
    /// Idle/safe value.
    pub idle: IdleTarget,
    /// Duty a PWM channel is created with at setup.
    #[serde(default)]
    pub initial_duty: u8,
}

impl ChannelSpec {
    /// A PWM output.
    pub fn pwm(id: u8, name: &str, role: ChannelRole, idle: IdleTarget) -> Self {
        let initial_duty = match idle {
            IdleTarget::Resting(duty) => duty,
            _ => 0,
        };
        Self {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::PwmOut,
            role,
            idle,
            initial_duty,
        }
    }

    /// A digital output resting LOW.
    pub fn digital_out(id: u8, name: &str, role: ChannelRole) -> Self {
        Self {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::DigitalOut,
            role,
            idle: IdleTarget::Low,
            initial_duty: 0,
        }
    }

    /// A digital input.
    pub fn input(id: u8, name: &str, role: ChannelRole) -> Self {
        Self {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::DigitalIn,
            role,
            idle: IdleTarget::Untouched,
            initial_duty: 0,
        }
    }

    /// A PWM output held at `duty` for the lifetime of the process.
    pub fn continuous(id: u8, name: &str, duty: u8) -> Self {
        Self {
            id: ChannelId(id),
            name: name.into(),
            kind: ChannelKind::PwmOut,
            role: ChannelRole::ContinuouslyDriven,
            idle: IdleTarget::Untouched,
            initial_duty: duty,
        }
    }

    /// Override the duty the channel is created with.
    pub fn with_initial_duty(mut self, duty: u8) -> Self {
        self.initial_duty = duty;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |kind: &'static str| ConfigError::InvalidIdle {
            name: self.name.clone(),
            idle: self.idle.to_string(),
            kind,
        };

        if self.role == ChannelRole::ContinuouslyDriven
            && (self.kind != ChannelKind::PwmOut || self.idle != IdleTarget::Untouched)
        {
            return Err(invalid("continuously-driven"));
        }

        match (self.kind, self.idle) {
            (ChannelKind::PwmOut, IdleTarget::Zero | IdleTarget::Untouched) => {}
            (ChannelKind::PwmOut, IdleTarget::Resting(duty)) => {
                if duty == 0 {
                    return Err(invalid(self.kind.as_str()));
                }
                check_duty(&self.name, duty)?;
            }
            (ChannelKind::DigitalOut, IdleTarget::Low | IdleTarget::Untouched) => {}
            (ChannelKind::DigitalIn, IdleTarget::Untouched) => {}
            (kind, _) => return Err(invalid(kind.as_str())),
        }

        check_duty(&self.name, self.initial_duty)
    }
}

pub(crate) fn check_duty(name: &str, duty: u8) -> Result<(), ConfigError> {
    if duty > PWM_RANGE {
        return Err(ConfigError::DutyOutOfRange {
            name: name.into(),
            duty,
        });
    }
    Ok(())
}

/// Validated set of channels for one apparatus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChannelSpec>", into = "Vec<ChannelSpec>")]
pub struct ChannelTable {
    channels: Vec<ChannelSpec>,
}

impl ChannelTable {
    /// Build a table, rejecting duplicates and inconsistent idle targets.
    pub fn new(channels: Vec<ChannelSpec>) -> Result<Self, ConfigError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for spec in &channels {
            if !ids.insert(spec.id) {
                return Err(ConfigError::DuplicateChannel(spec.id));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
            spec.validate()?;
        }
        Ok(Self { channels })
    }

    /// The table reproduced from the apparatus wiring.
    pub fn wiring_default() -> Self {
        use ChannelRole::*;
        Self {
            channels: vec![
                ChannelSpec::pwm(0, "arm_forward", ArmDrive, IdleTarget::Zero),
                ChannelSpec::pwm(7, "arm_reverse", ArmDrive, IdleTarget::Zero),
                ChannelSpec::pwm(1, "winch", WinchDrive, IdleTarget::Zero),
                ChannelSpec::pwm(3, "valve", ValveServo, IdleTarget::Resting(18))
                    .with_initial_duty(5),
                ChannelSpec::pwm(12, "stirrer_a", StirrerDrive, IdleTarget::Zero),
                ChannelSpec::pwm(13, "stirrer_b", StirrerDrive, IdleTarget::Zero),
                ChannelSpec::digital_out(14, "drain_pump", PumpOut),
                ChannelSpec::input(2, "forward_limit", LimitSwitch),
                ChannelSpec::input(15, "home_limit", LimitSwitch),
                ChannelSpec::input(16, "stop_button", StopButton),
            ],
        }
    }

    /// All channels in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.iter()
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Look up a channel by id.
    pub fn get(&self, id: ChannelId) -> Option<&ChannelSpec> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// Look up a channel by name.
    pub fn by_name(&self, name: &str) -> Result<&ChannelSpec, ConfigError> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ConfigError::UnknownChannel(name.into()))
    }

    /// Resolve `name` to a channel of the given kind.
    pub fn require(&self, name: &str, kind: ChannelKind) -> Result<ChannelId, ConfigError> {
        let spec = self.by_name(name)?;
        if spec.kind != kind {
            return Err(ConfigError::WrongKind {
                name: name.into(),
                expected: kind.as_str(),
                actual: spec.kind.as_str(),
            });
        }
        Ok(spec.id)
    }

    /// First channel with the stop-button role, if wired.
    pub fn stop_button(&self) -> Option<ChannelId> {
        self.channels
            .iter()
            .find(|c| c.role == ChannelRole::StopButton)
            .map(|c| c.id)
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::wiring_default()
    }
}

impl TryFrom<Vec<ChannelSpec>> for ChannelTable {
    type Error = ConfigError;

    fn try_from(channels: Vec<ChannelSpec>) -> Result<Self, Self::Error> {
        Self::new(channels)
    }
}

impl From<ChannelTable> for Vec<ChannelSpec> {
    fn from(table: ChannelTable) -> Self {
        table.channels
    }
}
