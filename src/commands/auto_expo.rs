//! Auto-expo command implementation
//!
//! One-shot measurement of suitable exposure times for a channel using the
//! instrument's automatic exposure control.

use crate::alerts::AlertEngine;
use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, AutoExpoResult};
use crate::commands::{load_config, open_devices};
use crate::domain::{ChannelConfig, ChannelId};
use crate::error::Result;
use crate::events::EventBus;
use crate::services::Monitor;
use std::sync::Arc;

/// Execute the auto-expo command
pub fn run_auto_expo(
    channel: u8,
    config_path: &Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let config = load_config(config_path)?;
    let id = ChannelId::new(channel)?;

    let (wavemeter, switch, dac) = open_devices(&config)?;
    let bus = Arc::new(EventBus::new());
    let engine = Arc::new(AlertEngine::new(Arc::clone(&bus)));
    let monitor = Monitor::new(
        wavemeter,
        switch,
        dac,
        engine,
        bus,
        config.monitor.to_monitor_config(),
    );

    // Registration is only needed so the channel exists; configuration from
    // the file is reused when present
    let channel_config = config
        .to_channels()?
        .into_iter()
        .map(|(c, _)| c)
        .find(|c| c.channel == id)
        .unwrap_or_else(|| ChannelConfig::new(id));
    monitor.add_channel(channel_config)?;

    let (expo_time, expo2_time) = monitor.get_auto_expo_params(id)?;
    print_output(
        &AutoExpoResult {
            channel,
            expo_time,
            expo2_time,
        },
        format,
    )?;
    Ok(())
}
