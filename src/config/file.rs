//! Configuration file loading
//!
//! Handles loading configuration from TOML files and importing channel
//! settings saved by the legacy dashboard as JSON.

use crate::config::{ChannelEntry, Config};
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration file handler
pub struct ConfigFile;

impl ConfigFile {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Option<Config> {
        for path in Self::default_paths() {
            if path.exists() {
                if let Ok(config) = Self::load(&path) {
                    log::info!("Loaded config from {}", path.display());
                    return Some(config);
                }
            }
        }
        None
    }

    /// Get default configuration file paths
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System-wide config
        paths.push(PathBuf::from("/etc/wavectl/config.toml"));

        // User config
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("wavectl/config.toml"));
        }

        // Current directory
        paths.push(PathBuf::from("wavectl.toml"));
        paths.push(PathBuf::from(".wavectl.toml"));

        paths
    }

    /// Import channel settings saved by the legacy dashboard
    ///
    /// The dashboard persisted one JSON object per channel with Hz
    /// setpoints. Entries convert into the TOML channel shape; the caller
    /// merges them into a [`Config`].
    pub fn import_legacy_channels<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<ChannelEntry>, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let entries: Vec<LegacyChannel> = serde_json::from_str(&content)?;
        Ok(entries.into_iter().map(ChannelEntry::from).collect())
    }
}

/// One channel as saved by the legacy dashboard
#[derive(Debug, Deserialize)]
struct LegacyChannel {
    channel_num: u8,
    #[serde(default)]
    channel_name: Option<String>,
    #[serde(default)]
    dac_channel_num: Option<u8>,
    #[serde(default)]
    expo_time: Option<u32>,
    #[serde(default)]
    expo2_time: Option<u32>,
    /// Setpoint in Hz, the dashboard's internal unit
    #[serde(default)]
    freq_setpoint: Option<f64>,
    #[serde(default)]
    freq_max_error: Option<f64>,
    #[serde(default)]
    pid_p: f64,
    #[serde(default)]
    pid_i: f64,
}

impl From<LegacyChannel> for ChannelEntry {
    fn from(legacy: LegacyChannel) -> Self {
        Self {
            channel: legacy.channel_num,
            name: legacy.channel_name,
            dac_channel: legacy.dac_channel_num,
            expo_time: legacy.expo_time,
            expo2_time: legacy.expo2_time,
            monitor: false,
            // The dashboard treated an assigned DAC plus setpoint as lock-enabled
            pid_enabled: legacy.dac_channel_num.is_some() && legacy.freq_setpoint.is_some(),
            setpoint_thz: legacy.freq_setpoint.map(|hz| hz / 1e12),
            max_error: legacy.freq_max_error,
            kp: legacy.pid_p,
            ki: legacy.pid_i,
            integral_clamp: None,
            alerts: Default::default(),
        }
    }
}
