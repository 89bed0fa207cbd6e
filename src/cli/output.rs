//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::domain::ChannelConfig;
use serde::Serialize;
use std::io::{self, Write};

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Table => {
            writeln!(handle, "{}", data.to_table())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
            writeln!(handle, "{}", json)?;
        }
        OutputFormat::Compact => {
            writeln!(handle, "{}", data.to_compact())?;
        }
    }

    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;

    /// Format as a compact single line
    fn to_compact(&self) -> String {
        self.to_table().replace('\n', " | ")
    }
}

/// Channel list entry for display
#[derive(Debug, Clone, Serialize)]
pub struct ChannelListEntry {
    pub channel: u8,
    pub name: String,
    pub monitor: bool,
    pub dac_channel: Option<u8>,
    pub setpoint_thz: Option<f64>,
    pub pid_enabled: bool,
}

impl ChannelListEntry {
    /// Build an entry from a channel configuration and its startup flag
    pub fn new(config: &ChannelConfig, monitor: bool) -> Self {
        Self {
            channel: config.channel.get(),
            name: config.name.clone(),
            monitor,
            dac_channel: config.dac_channel,
            setpoint_thz: config.pid.setpoint.map(|f| f.as_thz()),
            pid_enabled: config.pid.enabled,
        }
    }
}

impl TableDisplay for ChannelListEntry {
    fn to_table(&self) -> String {
        let setpoint = self
            .setpoint_thz
            .map(|thz| format!("{thz:.6} THz"))
            .unwrap_or_else(|| "-".to_string());
        let dac = self
            .dac_channel
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "[{}] {} (monitor: {}, dac: {}, setpoint: {}, pid: {})",
            self.channel,
            self.name,
            if self.monitor { "on" } else { "off" },
            dac,
            setpoint,
            if self.pid_enabled { "on" } else { "off" },
        )
    }

    fn to_compact(&self) -> String {
        format!("{}:{}", self.channel, self.name)
    }
}

/// Channel list for display
#[derive(Debug, Clone, Serialize)]
pub struct ChannelList {
    pub channels: Vec<ChannelListEntry>,
}

impl TableDisplay for ChannelList {
    fn to_table(&self) -> String {
        let mut output = format!("Channels configured: {}\n\n", self.channels.len());
        for channel in &self.channels {
            output.push_str(&channel.to_table());
            output.push('\n');
        }
        output
    }

    fn to_compact(&self) -> String {
        self.channels
            .iter()
            .map(|c| c.to_compact())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Auto-exposure measurement result for display
#[derive(Debug, Clone, Serialize)]
pub struct AutoExpoResult {
    pub channel: u8,
    pub expo_time: u32,
    pub expo2_time: u32,
}

impl TableDisplay for AutoExpoResult {
    fn to_table(&self) -> String {
        format!(
            "Channel {}: expo_time = {} ms, expo2_time = {} ms",
            self.channel, self.expo_time, self.expo2_time
        )
    }

    fn to_compact(&self) -> String {
        format!("{}:{}:{}", self.channel, self.expo_time, self.expo2_time)
    }
}
