//! Channel domain types
//!
//! A channel is one of up to 16 optical signal paths multiplexed into the
//! wavemeter. Configuration is owned by the consumer and read by the control
//! loop once per poll cycle; runtime state is mutated by the control loop
//! only.

use crate::domain::{Frequency, LongtermSeries};
use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Instant;

/// Maximum number of fiber switch ports
pub const MAX_CHANNELS: usize = 16;

/// Validated channel number, 1..=16
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelId(u8);

impl ChannelId {
    /// Create a channel id, rejecting values outside 1..=16
    pub fn new(num: u8) -> Result<Self, DomainError> {
        if num == 0 || num as usize > MAX_CHANNELS {
            return Err(DomainError::InvalidChannelNumber(num));
        }
        Ok(Self(num))
    }

    /// The channel number (1-based)
    #[inline]
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based slot index for fixed-size per-channel arrays
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChannelId> for u8 {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

/// PID loop settings for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PidConfig {
    /// Whether the feedback loop runs for this channel
    pub enabled: bool,
    /// Frequency setpoint; deviation tracking and PID need it
    pub setpoint: Option<Frequency>,
    /// Maximum tolerated |error| in Hz before the channel counts as deviating
    pub max_error: Option<f64>,
    /// Proportional gain, DAC counts per THz of error
    pub kp: f64,
    /// Integral gain, DAC counts per THz-second of accumulated error
    pub ki: f64,
    /// Optional symmetric clamp on the integral accumulator (anti-windup)
    pub integral_clamp: Option<f64>,
}

/// Per-category alert enable flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertFlags {
    /// Post frequency out-of-bound (deviating / out-of-lock) alerts
    pub out_of_bound: bool,
    /// Post DAC railed alerts
    pub dac_railed: bool,
    /// Post wavemeter signal alerts
    pub wavemeter: bool,
}

impl Default for AlertFlags {
    fn default() -> Self {
        Self {
            out_of_bound: true,
            dac_railed: true,
            wavemeter: true,
        }
    }
}

/// Static configuration of one monitored channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Fiber switch port this channel occupies
    pub channel: ChannelId,
    /// Display name
    pub name: String,
    /// DAC output driving this channel's laser, if any
    pub dac_channel: Option<u8>,
    /// CCD exposure time in ms
    pub expo_time: Option<u32>,
    /// Second CCD array exposure time in ms
    pub expo2_time: Option<u32>,
    /// PID loop settings
    #[serde(default)]
    pub pid: PidConfig,
    /// Alert category enables
    #[serde(default)]
    pub alerts: AlertFlags,
}

impl ChannelConfig {
    /// Create a configuration with defaults for everything but the id
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            name: channel.to_string(),
            dac_channel: None,
            expo_time: None,
            expo2_time: None,
            pid: PidConfig::default(),
            alerts: AlertFlags::default(),
        }
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.pid.enabled && self.dac_channel.is_none() {
            return Err(DomainError::InvalidValue(format!(
                "channel {}: pid enabled but no dac_channel assigned",
                self.channel
            )));
        }
        if self.pid.enabled && self.pid.setpoint.is_none() {
            return Err(DomainError::InvalidValue(format!(
                "channel {}: pid enabled but no setpoint configured",
                self.channel
            )));
        }
        if let Some(max_error) = self.pid.max_error {
            if !max_error.is_finite() || max_error <= 0.0 {
                return Err(DomainError::InvalidValue(format!(
                    "channel {}: max_error must be positive and finite",
                    self.channel
                )));
            }
        }
        if let Some(setpoint) = self.pid.setpoint {
            if !setpoint.as_hz().is_finite() || setpoint.as_hz() <= 0.0 {
                return Err(DomainError::InvalidValue(format!(
                    "channel {}: setpoint must be positive and finite",
                    self.channel
                )));
            }
        }
        Ok(())
    }
}

/// Live measurement and feedback state of one monitored channel
///
/// Mutated by the poll task only; consumers read snapshots after a
/// notification.
#[derive(Debug, Default)]
pub struct ChannelRuntime {
    /// Last frequency measurement
    pub frequency: Option<Frequency>,
    /// Last interferometer pattern, if a consumer subscribed
    pub pattern: Option<Vec<u16>>,
    /// Last wide interferometer pattern, if a consumer subscribed
    pub wide_pattern: Option<Vec<u16>>,
    /// Frequency history
    pub freq_longterm: LongtermSeries,
    /// DAC output history
    pub dac_longterm: LongtermSeries,
    /// Integral accumulator, THz-seconds of error
    pub pid_i: f64,
    /// Time of the last PID update; None before the first step
    pub pid_last_update: Option<Instant>,
    /// Signed frequency error in Hz
    pub error: f64,
    /// Last commanded DAC output in counts
    pub dac_output: f64,
    /// Whether the DAC is saturated at a rail
    pub dac_railed: bool,
    /// When the channel first left the error bound; None while in bound
    pub deviate_since: Option<Instant>,
    /// When the channel last returned within bound; None while deviating
    pub stable_since: Option<Instant>,
}

impl ChannelRuntime {
    /// Runtime state with a capacity limit on both history series
    ///
    /// `None` keeps the series unbounded.
    pub fn with_history_limit(limit: Option<usize>) -> Self {
        match limit {
            Some(limit) => Self {
                freq_longterm: LongtermSeries::with_limit(limit),
                dac_longterm: LongtermSeries::with_limit(limit),
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    /// Reset the feedback bookkeeping, done before each monitoring run
    pub fn reset_pid_state(&mut self) {
        self.pid_i = 0.0;
        self.pid_last_update = None;
        self.deviate_since = None;
        self.stable_since = None;
    }
}

/// Shared handle to one registered channel
///
/// The configuration lock is written by the consumer thread and read by the
/// poll task once per channel visit; the runtime lock is held only for
/// short, I/O-free critical sections.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    config: RwLock<ChannelConfig>,
    runtime: Mutex<ChannelRuntime>,
    monitor_enabled: AtomicBool,
}

impl Channel {
    /// Wrap a validated configuration into a channel handle
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_history_limit(config, None)
    }

    /// Channel handle with a capacity limit on the runtime history series
    pub fn with_history_limit(config: ChannelConfig, limit: Option<usize>) -> Self {
        Self {
            id: config.channel,
            config: RwLock::new(config),
            runtime: Mutex::new(ChannelRuntime::with_history_limit(limit)),
            monitor_enabled: AtomicBool::new(false),
        }
    }

    /// The channel id
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> ChannelConfig {
        self.config.read().expect("channel config lock poisoned").clone()
    }

    /// Replace the configuration (same channel id required)
    pub fn update_config(&self, config: ChannelConfig) -> Result<(), DomainError> {
        if config.channel != self.id {
            return Err(DomainError::InvalidValue(format!(
                "cannot change channel id {} to {}",
                self.id, config.channel
            )));
        }
        config.validate()?;
        *self.config.write().expect("channel config lock poisoned") = config;
        Ok(())
    }

    /// Access the runtime state under its lock
    pub fn with_runtime<R>(&self, f: impl FnOnce(&mut ChannelRuntime) -> R) -> R {
        let mut runtime = self.runtime.lock().expect("channel runtime lock poisoned");
        f(&mut runtime)
    }

    /// Non-blocking runtime access; None when the lock is contended
    ///
    /// For readers that must not stall behind the poll task, display
    /// refresh being the typical case.
    pub fn try_with_runtime<R>(&self, f: impl FnOnce(&mut ChannelRuntime) -> R) -> Option<R> {
        match self.runtime.try_lock() {
            Ok(mut runtime) => Some(f(&mut runtime)),
            Err(std::sync::TryLockError::WouldBlock) => None,
            Err(std::sync::TryLockError::Poisoned(e)) => {
                panic!("channel runtime lock poisoned: {e}")
            }
        }
    }

    /// Whether this channel participates in the poll cycle
    pub fn monitor_enabled(&self) -> bool {
        self.monitor_enabled.load(Ordering::Acquire)
    }

    /// Toggle poll cycle participation
    pub fn set_monitor_enabled(&self, enabled: bool) {
        self.monitor_enabled.store(enabled, Ordering::Release);
    }
}
