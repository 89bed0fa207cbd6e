//! Dac-reset command implementation
//!
//! Returns a channel's DAC output to midscale, releasing the laser from
//! whatever the last lock left behind.

use crate::alerts::AlertEngine;
use crate::commands::{load_config, open_devices};
use crate::domain::ChannelId;
use crate::error::{AppError, Result};
use crate::events::EventBus;
use crate::services::Monitor;
use std::sync::Arc;

/// Execute the dac-reset command
pub fn run_dac_reset(channel: u8, config_path: &Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let id = ChannelId::new(channel)?;

    let channel_config = config
        .to_channels()?
        .into_iter()
        .map(|(c, _)| c)
        .find(|c| c.channel == id)
        .ok_or(AppError::ChannelNotRegistered(channel))?;

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
    monitor.add_channel(channel_config)?;
    monitor.reset_channel_dac(id)?;
    log::info!("channel {} dac reset to midscale", channel);
    Ok(())
}
