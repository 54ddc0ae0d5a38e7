//! Error types for configuration and sequence control.

use std::path::PathBuf;

use thiserror::Error;

use crate::traits::ChannelId;

/// Invalid or unloadable configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two channel entries share the same id.
    #[error("duplicate channel id {0}")]
    DuplicateChannel(ChannelId),

    /// Two channel entries share the same name.
    #[error("duplicate channel name `{0}`")]
    DuplicateName(String),

    /// A cycle step refers to a channel name missing from the table.
    #[error("no channel named `{0}` in the channel table")]
    UnknownChannel(String),

    /// A channel is referenced with the wrong kind (e.g. PWM write on an input).
    #[error("channel `{name}` is {actual}, expected {expected}")]
    WrongKind {
        /// Channel name.
        name: String,
        /// Kind the reference needs.
        expected: &'static str,
        /// Kind declared in the table.
        actual: &'static str,
    },

    /// The idle target cannot be applied to this channel kind or role.
    #[error("channel `{name}`: idle target {idle} is not valid for a {kind} channel")]
    InvalidIdle {
        /// Channel name.
        name: String,
        /// Offending idle target.
        idle: String,
        /// Kind (or role) of the channel.
        kind: &'static str,
    },

    /// A duty value exceeds the PWM range.
    #[error("duty {duty} for `{name}` exceeds PWM range")]
    DutyOutOfRange {
        /// Channel or calibration entry name.
        name: String,
        /// Offending duty.
        duty: u8,
    },

    /// A step declares more writes than a step can hold.
    #[error("step `{0}` has too many channel writes")]
    TooManyWrites(String),

    /// Reading the configuration file failed.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or schema error.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or schema error.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file extension is neither `.toml` nor `.json`.
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Errors raised by the sequencer and its hardware port.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// The hardware port reported a failure.
    #[error("hardware port error on {channel}: {source}")]
    Hardware {
        /// Channel being accessed when the failure occurred.
        channel: ChannelId,
        /// Port-specific error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Hardware setup failed before the control surface came up.
    #[error("hardware setup failed: {0}")]
    Setup(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A limit switch did not trip within the configured timeout.
    #[error("limit switch {channel} not reached within {timeout_ms} ms")]
    LimitTimeout {
        /// Input channel being polled.
        channel: ChannelId,
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The run thread could not be spawned.
    #[error("failed to spawn sequence thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Configuration rejected at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SequenceError {
    /// Wrap a port error for `channel`.
    pub fn hardware<E>(channel: ChannelId, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Hardware {
            channel,
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_error_message_names_channel() {
        let err = SequenceError::hardware(
            ChannelId(3),
            std::io::Error::other("bus fault"),
        );
        assert_eq!(err.to_string(), "hardware port error on ch3: bus fault");
    }

    #[test]
    fn limit_timeout_message() {
        let err = SequenceError::LimitTimeout {
            channel: ChannelId(2),
            timeout_ms: 5000,
        };
        assert_eq!(err.to_string(), "limit switch ch2 not reached within 5000 ms");
    }

    #[test]
    fn config_error_converts() {
        let err: SequenceError = ConfigError::UnknownChannel("valve".into()).into();
        assert!(matches!(err, SequenceError::Config(_)));
        assert_eq!(err.to_string(), "no channel named `valve` in the channel table");
    }
}
