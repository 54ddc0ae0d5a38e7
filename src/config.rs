//! Configuration for the control surface, run timing, cycle calibration and
//! channel wiring.
//!
//! Every section has working defaults reproduced from the apparatus, so an
//! empty config file is valid. Files are TOML or JSON, chosen by extension.
//!
//! # Example
//!
//! ```rust
//! use rs_washcycle::config::{Config, CycleConfig, SequenceConfig, WebConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert_eq!(config.web.port, 8080);
//!
//! // Or customize
//! let config = Config::default()
//!     .with_web(WebConfig::default().with_port(3000))
//!     .with_sequence(SequenceConfig::default().with_limit_timeout_ms(Some(30_000)))
//!     .with_cycle(CycleConfig::default().with_step_delay_ms(1500));
//!
//! // Or load from TOML
//! let config = Config::from_toml_str("[web]\nport = 9000\n").unwrap();
//! assert_eq!(config.web.port, 9000);
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelTable;
use crate::error::ConfigError;
use crate::sequence::RunTiming;

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP control surface
    pub web: WebConfig,
    /// Run timing and stop button
    pub sequence: SequenceConfig,
    /// Duty and dwell calibration for the wash cycle
    pub cycle: CycleConfig,
    /// Channel wiring table
    pub channels: ChannelTable,
    /// Device identification
    pub device: DeviceConfig,
}

impl Config {
    /// Load from a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Parse JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Set web configuration
    pub fn with_web(mut self, web: WebConfig) -> Self {
        self.web = web;
        self
    }

    /// Set sequence configuration
    pub fn with_sequence(mut self, sequence: SequenceConfig) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set cycle calibration
    pub fn with_cycle(mut self, cycle: CycleConfig) -> Self {
        self.cycle = cycle;
        self
    }

    /// Set the channel table
    pub fn with_channels(mut self, channels: ChannelTable) -> Self {
        self.channels = channels;
        self
    }

    /// Set device configuration
    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.device = device;
        self
    }
}

// ============================================================================
// Web Config
// ============================================================================

/// HTTP control surface configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Address to bind
    pub bind: IpAddr,
    /// Port to listen on
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

impl WebConfig {
    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the bind address
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Socket address to listen on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

// ============================================================================
// Sequence Config
// ============================================================================

/// Run timing configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Limit-switch poll and cancellation check interval in milliseconds
    pub poll_interval_ms: u64,
    /// Give up on a limit switch after this many milliseconds (`None` = wait forever)
    pub limit_timeout_ms: Option<u64>,
    /// Whether the physical stop button is watched
    pub stop_button_enabled: bool,
    /// Stop button poll interval in milliseconds
    pub stop_button_poll_ms: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            limit_timeout_ms: None,
            stop_button_enabled: false,
            stop_button_poll_ms: 20,
        }
    }
}

impl SequenceConfig {
    /// Set the poll interval
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms.max(1);
        self
    }

    /// Set the limit-switch timeout
    pub fn with_limit_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.limit_timeout_ms = ms;
        self
    }

    /// Enable or disable the stop button watcher
    pub fn with_stop_button(mut self, enabled: bool) -> Self {
        self.stop_button_enabled = enabled;
        self
    }

    /// Timing handed to the sequence runner
    pub fn timing(&self) -> RunTiming {
        RunTiming {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            limit_timeout: self.limit_timeout_ms.map(Duration::from_millis),
        }
    }
}

// ============================================================================
// Cycle Config
// ============================================================================

/// Wash cycle calibration: duties (percent) and dwell times (milliseconds)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Full drive duty
    pub drive_full: u8,
    /// Half drive duty
    pub drive_half: u8,
    /// Valve duty while filling
    pub valve_fill: u8,
    /// Valve duty while locked
    pub valve_lock: u8,
    /// Winch duty while lowering
    pub winch_lower: u8,
    /// Winch duty while raising
    pub winch_raise: u8,
    /// Dwell between timed steps
    pub step_delay_ms: u64,
    /// Dwell after the forward limit trips
    pub limit_settle_ms: u64,
    /// Dwell after opening the drain
    pub drain_settle_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            drive_full: 100,
            drive_half: 50,
            valve_fill: 5,
            valve_lock: 18,
            winch_lower: 40,
            winch_raise: 10,
            step_delay_ms: 3000,
            limit_settle_ms: 100,
            drain_settle_ms: 10,
        }
    }
}

impl CycleConfig {
    /// Set the dwell between timed steps
    pub fn with_step_delay_ms(mut self, ms: u64) -> Self {
        self.step_delay_ms = ms;
        self
    }

    /// Set the settle time after the forward limit
    pub fn with_limit_settle_ms(mut self, ms: u64) -> Self {
        self.limit_settle_ms = ms;
        self
    }

    /// Set the settle time after opening the drain
    pub fn with_drain_settle_ms(mut self, ms: u64) -> Self {
        self.drain_settle_ms = ms;
        self
    }
}

// ============================================================================
// Device Config
// ============================================================================

/// Device identification configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Human-readable device name
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "rs-washcycle".into(),
        }
    }
}

impl DeviceConfig {
    /// Set the device name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
