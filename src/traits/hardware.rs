//! Hardware abstraction traits for digital I/O, PWM outputs, and the stop button.
//!
//! This module defines the hardware interface the sequencer drives. The core
//! never caches channel state: every write goes straight to the port and
//! every read is fresh.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`HardwarePort`] | Digital write/read and PWM duty write by logical channel |
//! | [`StopButton`] | Edge-detected physical emergency stop input |
//!
//! # Implementation
//!
//! For testing and desktop development, use [`MockPort`] from
//! [`crate::hal::mock`]. Board bindings implement [`HardwarePort`] on top of
//! their GPIO/PWM driver and are wired up by the binary at startup.
//!
//! # Example
//!
//! ```rust
//! use rs_washcycle::traits::{ChannelId, HardwarePort, Level};
//! use rs_washcycle::hal::MockPort;
//!
//! let mut port = MockPort::new();
//! port.write_pwm(ChannelId(0), 100).unwrap();
//! port.write_digital(ChannelId(14), Level::High).unwrap();
//!
//! assert_eq!(port.duty(ChannelId(0)), Some(100));
//! assert_eq!(port.level(ChannelId(14)), Some(Level::High));
//! ```
//!
//! [`MockPort`]: crate::hal::MockPort

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelTable;

/// Full-scale PWM duty. Duties are expressed as a percentage of this range.
pub const PWM_RANGE: u8 = 100;

/// Logic level of a digital channel.
///
/// # Default
///
/// Defaults to [`Low`](Self::Low), the resting level of every digital output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Logic low (0).
    #[default]
    Low,
    /// Logic high (1).
    High,
}

impl Level {
    /// Returns true for [`Level::High`].
    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }

    /// Returns the level as a lowercase string.
    ///
    /// # Examples
    ///
    /// ```
    /// use rs_washcycle::Level;
    ///
    /// assert_eq!(Level::High.as_str(), "high");
    /// assert_eq!(Level::Low.as_str(), "low");
    /// ```
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::High => "high",
        }
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Logical channel identifier.
///
/// Maps onto a physical pin number in the port implementation; the
/// sequencer itself never interprets the number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Hardware port trait - abstracts digital and PWM channel access.
///
/// Implement this trait for your GPIO/PWM backend. All operations are
/// synchronous and expected to return promptly.
///
/// # Implementation Notes
///
/// - `setup()` is called exactly once at startup, before any other method.
///   Configure pin directions and create PWM channels at
///   [`ChannelSpec::initial_duty`](crate::channel::ChannelSpec::initial_duty).
/// - `write_pwm()` receives a duty in `0..=PWM_RANGE`; clamp anything above.
/// - Errors from `setup()` are treated as fatal by the caller.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rs_washcycle::traits::{ChannelId, HardwarePort, Level};
/// use rs_washcycle::channel::ChannelTable;
///
/// struct MyPort { /* gpio handles */ }
///
/// impl HardwarePort for MyPort {
///     type Error = std::io::Error;
///
///     fn setup(&mut self, table: &ChannelTable) -> Result<(), Self::Error> {
///         // Set pin modes, create soft-PWM channels...
///         Ok(())
///     }
///
///     fn write_digital(&mut self, ch: ChannelId, level: Level) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     fn read_digital(&mut self, ch: ChannelId) -> Result<Level, Self::Error> {
///         Ok(Level::Low)
///     }
///
///     fn write_pwm(&mut self, ch: ChannelId, duty: u8) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
/// ```
pub trait HardwarePort: Send {
    /// Error type for port operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// One-time channel setup: pin directions and PWM ranges.
    fn setup(&mut self, table: &ChannelTable) -> Result<(), Self::Error>;

    /// Drive a digital output to `level`.
    fn write_digital(&mut self, channel: ChannelId, level: Level) -> Result<(), Self::Error>;

    /// Read the current level of a digital input.
    fn read_digital(&mut self, channel: ChannelId) -> Result<Level, Self::Error>;

    /// Set the PWM duty of a channel, as a percentage of [`PWM_RANGE`].
    fn write_pwm(&mut self, channel: ChannelId, duty: u8) -> Result<(), Self::Error>;
}

/// Physical emergency stop input.
///
/// Equivalent in effect to `GET /stop`. Implementations must report each
/// press once (rising-edge detection), so a held button does not keep
/// re-asserting the stop.
pub trait StopButton {
    /// Returns true if the button was pressed since the last call.
    fn just_pressed(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Level Tests
    // =========================================================================

    #[test]
    fn level_default_is_low() {
        assert_eq!(Level::default(), Level::Low);
    }

    #[test]
    fn level_from_bool() {
        assert_eq!(Level::from(true), Level::High);
        assert_eq!(Level::from(false), Level::Low);
    }

    #[test]
    fn level_is_high() {
        assert!(Level::High.is_high());
        assert!(!Level::Low.is_high());
    }

    #[test]
    fn level_serde_lowercase() {
        let json = serde_json::to_string(&Level::High).unwrap();
        assert_eq!(json, r#""high""#);
        let parsed: Level = serde_json::from_str(r#""low""#).unwrap();
        assert_eq!(parsed, Level::Low);
    }

    // =========================================================================
    // ChannelId Tests
    // =========================================================================

    #[test]
    fn channel_id_display() {
        assert_eq!(ChannelId(13).to_string(), "ch13");
    }

    #[test]
    fn channel_id_serializes_as_number() {
        let json = serde_json::to_string(&ChannelId(7)).unwrap();
        assert_eq!(json, "7");
    }

    // =========================================================================
    // StopButton Tests
    // =========================================================================

    struct LatchedButton {
        pending: bool,
    }

    impl StopButton for LatchedButton {
        fn just_pressed(&mut self) -> bool {
            core::mem::take(&mut self.pending)
        }
    }

    #[test]
    fn stop_button_reports_once() {
        let mut button = LatchedButton { pending: true };
        assert!(button.just_pressed());
        assert!(!button.just_pressed());
    }
}
