//! Configuration system
//!
//! Handles TOML config file parsing and conversion into domain types.

pub mod file;

pub use file::ConfigFile;

use crate::domain::{AlertFlags, ChannelConfig, ChannelId, Frequency, PidConfig};
use crate::error::{ConfigError, DomainError};
use crate::services::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Instrument connection settings
    pub devices: DeviceConfig,
    /// Poll loop timing settings
    pub monitor: MonitorTimingConfig,
    /// Monitored channels
    pub channels: Vec<ChannelEntry>,
}

impl Config {
    /// Validate and convert the channel entries into domain configurations
    ///
    /// Returned in file order, paired with the startup monitor-enable flag.
    pub fn to_channels(&self) -> Result<Vec<(ChannelConfig, bool)>, ConfigError> {
        let mut seen = HashSet::new();
        let mut channels = Vec::with_capacity(self.channels.len());
        for entry in &self.channels {
            let config = entry.to_channel_config().map_err(|e| {
                ConfigError::InvalidValue {
                    key: format!("channels.{}", entry.channel),
                    message: e.to_string(),
                }
            })?;
            if !seen.insert(entry.channel) {
                return Err(ConfigError::InvalidValue {
                    key: format!("channels.{}", entry.channel),
                    message: DomainError::DuplicateChannel(entry.channel).to_string(),
                });
            }
            channels.push((config, entry.monitor));
        }
        Ok(channels)
    }
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,
}

/// Instrument connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial device of the fiber switch
    pub fiberswitch_port: String,
    /// Serial device of the DAC
    pub dac_port: String,
    /// Path or name of the wlmData library
    pub wavemeter_lib: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            fiberswitch_port: "/dev/ttyUSB0".to_string(),
            dac_port: "/dev/ttyUSB1".to_string(),
            wavemeter_lib: crate::hardware::ws7::DEFAULT_LIB.to_string(),
        }
    }
}

/// Poll loop timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorTimingConfig {
    /// Settle wait after a fiber switch command, in ms
    pub switch_settle_ms: u64,
    /// Delay when revisiting the already-selected channel, in ms
    pub same_channel_delay_ms: u64,
    /// Fast acquisition retries before the final attempt
    pub retry_attempts: u32,
    /// Backoff between acquisition retries, in ms
    pub retry_backoff_ms: u64,
    /// Out-of-bound seconds before the deviation warning posts
    pub deviate_warning_s: u64,
    /// Out-of-bound seconds before the out-of-lock alert posts
    pub out_of_lock_s: u64,
    /// In-bound seconds before the locked alert posts
    pub locked_s: u64,
    /// Auto-exposure settle window, in ms
    pub auto_expo_settle_ms: u64,
    /// Samples kept per channel history series; omit to keep everything
    pub longterm_limit: Option<usize>,
}

impl Default for MonitorTimingConfig {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            switch_settle_ms: defaults.switch_settle.as_millis() as u64,
            same_channel_delay_ms: defaults.same_channel_delay.as_millis() as u64,
            retry_attempts: defaults.retry_attempts,
            retry_backoff_ms: defaults.retry_backoff.as_millis() as u64,
            deviate_warning_s: defaults.deviate_warning_after.as_secs(),
            out_of_lock_s: defaults.out_of_lock_after.as_secs(),
            locked_s: defaults.locked_after.as_secs(),
            auto_expo_settle_ms: defaults.auto_expo_settle.as_millis() as u64,
            longterm_limit: defaults.longterm_limit,
        }
    }
}

impl MonitorTimingConfig {
    /// Convert to the control loop's timing knobs
    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            switch_settle: Duration::from_millis(self.switch_settle_ms),
            same_channel_delay: Duration::from_millis(self.same_channel_delay_ms),
            retry_attempts: self.retry_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            deviate_warning_after: Duration::from_secs(self.deviate_warning_s),
            out_of_lock_after: Duration::from_secs(self.out_of_lock_s),
            locked_after: Duration::from_secs(self.locked_s),
            auto_expo_settle: Duration::from_millis(self.auto_expo_settle_ms),
            longterm_limit: self.longterm_limit,
        }
    }
}

/// One monitored channel in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelEntry {
    /// Fiber switch port, 1..=16
    pub channel: u8,
    /// Display name; defaults to the channel number
    pub name: Option<String>,
    /// DAC output driving this channel's laser
    pub dac_channel: Option<u8>,
    /// First CCD exposure time, ms
    pub expo_time: Option<u32>,
    /// Second CCD exposure time, ms
    pub expo2_time: Option<u32>,
    /// Enable monitoring at startup
    pub monitor: bool,
    /// Run the PID feedback loop
    pub pid_enabled: bool,
    /// Frequency setpoint in THz
    pub setpoint_thz: Option<f64>,
    /// Maximum tolerated |error| in Hz
    pub max_error: Option<f64>,
    /// Proportional gain, DAC counts per THz
    pub kp: f64,
    /// Integral gain, DAC counts per THz-second
    pub ki: f64,
    /// Symmetric clamp on the integral accumulator
    pub integral_clamp: Option<f64>,
    /// Alert category enables
    pub alerts: AlertFlags,
}

impl Default for ChannelEntry {
    fn default() -> Self {
        Self {
            channel: 1,
            name: None,
            dac_channel: None,
            expo_time: None,
            expo2_time: None,
            monitor: false,
            pid_enabled: false,
            setpoint_thz: None,
            max_error: None,
            kp: 0.0,
            ki: 0.0,
            integral_clamp: None,
            alerts: AlertFlags::default(),
        }
    }
}

impl ChannelEntry {
    /// Convert to a validated domain channel configuration
    pub fn to_channel_config(&self) -> Result<ChannelConfig, DomainError> {
        let id = ChannelId::new(self.channel)?;
        let config = ChannelConfig {
            channel: id,
            name: self.name.clone().unwrap_or_else(|| id.to_string()),
            dac_channel: self.dac_channel,
            expo_time: self.expo_time,
            expo2_time: self.expo2_time,
            pid: PidConfig {
                enabled: self.pid_enabled,
                setpoint: self.setpoint_thz.map(Frequency::from_thz),
                max_error: self.max_error,
                kp: self.kp,
                ki: self.ki,
                integral_clamp: self.integral_clamp,
            },
            alerts: self.alerts,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.channels.is_empty());
        assert_eq!(config.monitor.retry_attempts, 5);
        assert_eq!(config.monitor.switch_settle_ms, 200);
    }

    #[test]
    fn test_timing_round_trip() {
        let timing = MonitorTimingConfig::default().to_monitor_config();
        let defaults = MonitorConfig::default();
        assert_eq!(timing.switch_settle, defaults.switch_settle);
        assert_eq!(timing.out_of_lock_after, defaults.out_of_lock_after);
        assert_eq!(timing.longterm_limit, None);
    }

    #[test]
    fn test_longterm_limit_parsed() {
        let toml = r#"
            [monitor]
            longterm_limit = 500
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.monitor.to_monitor_config().longterm_limit,
            Some(500)
        );
    }

    #[test]
    fn test_channel_entry_conversion() {
        let entry = ChannelEntry {
            channel: 3,
            name: Some("repump".to_string()),
            dac_channel: Some(3),
            pid_enabled: true,
            setpoint_thz: Some(384.2281),
            max_error: Some(2e6),
            kp: -500.0,
            ki: -50.0,
            ..ChannelEntry::default()
        };
        let config = entry.to_channel_config().unwrap();
        assert_eq!(config.channel.get(), 3);
        assert_eq!(config.name, "repump");
        assert!((config.pid.setpoint.unwrap().as_thz() - 384.2281).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_channel_number_rejected() {
        let entry = ChannelEntry {
            channel: 17,
            ..ChannelEntry::default()
        };
        assert!(entry.to_channel_config().is_err());
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let config = Config {
            channels: vec![
                ChannelEntry {
                    channel: 2,
                    ..ChannelEntry::default()
                },
                ChannelEntry {
                    channel: 2,
                    ..ChannelEntry::default()
                },
            ],
            ..Config::default()
        };
        assert!(config.to_channels().is_err());
    }

    #[test]
    fn test_toml_parse() {
        let toml = r#"
            [devices]
            fiberswitch_port = "/dev/ttyUSB3"

            [[channels]]
            channel = 1
            name = "cooling"
            monitor = true

            [[channels]]
            channel = 5
            dac_channel = 2
            pid_enabled = true
            setpoint_thz = 384.2281
            max_error = 1e6
            kp = -100.0
            ki = -10.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.devices.fiberswitch_port, "/dev/ttyUSB3");
        let channels = config.to_channels().unwrap();
        assert_eq!(channels.len(), 2);
        assert!(channels[0].1);
        assert!(!channels[1].1);
        assert!(channels[1].0.pid.enabled);
    }
}
