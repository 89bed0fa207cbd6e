//! Unified error types for wavectl
//!
//! This module defines all error types used throughout the application.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from the wavemeter driver
    #[error("Wavemeter error: {0}")]
    Wavemeter(#[from] WavemeterError),

    /// Error from the fiber switch driver
    #[error("Fiber switch error: {0}")]
    Switch(#[from] SwitchError),

    /// Error from the DAC driver
    #[error("DAC error: {0}")]
    Dac(#[from] DacError),

    /// Error from domain type validation
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    /// Error from configuration parsing/validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel is not registered with the monitor
    #[error("Channel {0} is not registered")]
    ChannelNotRegistered(u8),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the wavemeter driver
///
/// Signal errors (no/bad/low/high signal) describe a transient optical
/// condition on the currently switched channel; command errors indicate a
/// broken link to the instrument.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WavemeterError {
    /// No light reaches the interferometer
    #[error("no signal")]
    NoSignal,

    /// Signal present but unusable (multimode, fringe contrast too low)
    #[error("bad signal")]
    BadSignal,

    /// Under-exposed measurement
    #[error("low signal")]
    LowSignal,

    /// Over-exposed measurement
    #[error("high signal")]
    HighSignal,

    /// The wavemeter server application is not running
    #[error("wavemeter server inactive")]
    InstrumentMissing,

    /// The wlmData library could not be loaded
    #[error("wavemeter library not found: {0}")]
    LibraryNotFound(String),

    /// A command (exposure, mode) was rejected by the instrument
    #[error("command failed: {0}")]
    Command(String),

    /// Unclassified instrument error
    #[error("unknown wavemeter error: {0}")]
    Unknown(String),
}

impl WavemeterError {
    /// Whether this error describes a transient optical condition rather
    /// than a broken instrument link. Signal errors are recovered by
    /// retry-then-alert; everything else is fatal to the poll task.
    pub fn is_signal_error(&self) -> bool {
        matches!(
            self,
            Self::NoSignal | Self::BadSignal | Self::LowSignal | Self::HighSignal | Self::Unknown(_)
        )
    }
}

/// Errors from the fiber switch driver
#[derive(Error, Debug)]
pub enum SwitchError {
    /// Serial port failure
    #[error("serial port error: {0}")]
    Port(String),

    /// Post-switch readback did not match the requested channel
    #[error("switched to channel {requested} but readback reports {actual}")]
    ReadbackMismatch { requested: u8, actual: u8 },

    /// Malformed response from the switch firmware
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Errors from the DAC driver
#[derive(Error, Debug)]
pub enum DacError {
    /// Requested output outside the representable range. The driver clamps
    /// to min/max and still fails, so the caller can flag the rail.
    #[error("DAC output {requested} out of bound (range {min}..={max})")]
    OutOfBound { requested: f64, min: f64, max: f64 },

    /// Serial port failure
    #[error("serial port error: {0}")]
    Port(String),

    /// Malformed response from the DAC firmware
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Errors from domain type validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Channel number outside 1..=16
    #[error("Invalid channel number: {0} (must be 1-16)")]
    InvalidChannelNumber(u8),

    /// Channel number registered twice
    #[error("Channel {0} is already configured")]
    DuplicateChannel(u8),

    /// Invalid numeric field
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Errors from configuration parsing and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Invalid config value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required config field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error (legacy dashboard settings import)
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
