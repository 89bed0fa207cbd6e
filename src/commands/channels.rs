//! Channels command implementation
//!
//! Lists the configured channels and converts legacy dashboard settings.

use crate::cli::args::OutputFormat;
use crate::cli::output::{print_output, ChannelList, ChannelListEntry};
use crate::commands::load_config;
use crate::config::{ChannelEntry, ConfigFile};
use crate::error::Result;
use serde::Serialize;

/// Execute the channels command
pub fn run_channels(config_path: &Option<String>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let channels = config.to_channels()?;

    let list = ChannelList {
        channels: channels
            .iter()
            .map(|(config, monitor)| ChannelListEntry::new(config, *monitor))
            .collect(),
    };
    print_output(&list, format)?;
    Ok(())
}

#[derive(Serialize)]
struct ImportedChannels {
    channels: Vec<ChannelEntry>,
}

/// Execute the import-channels command: print legacy JSON settings as TOML
pub fn run_import_channels(path: &str) -> Result<()> {
    let channels = ConfigFile::import_legacy_channels(path)?;
    for entry in &channels {
        // Surface validation problems now rather than at monitor startup
        entry.to_channel_config()?;
    }
    let toml = toml::to_string_pretty(&ImportedChannels { channels }).map_err(|e| {
        crate::error::AppError::Config(crate::error::ConfigError::InvalidValue {
            key: "channels".to_string(),
            message: e.to_string(),
        })
    })?;
    println!("{toml}");
    Ok(())
}
