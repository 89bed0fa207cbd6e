//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Wavemeter channel monitor and laser-lock controller
///
/// Polls up to 16 fiber-switched channels on a HighFinesse wavemeter and
/// holds lasers on their setpoints through a serial DAC.
#[derive(Parser, Debug)]
#[command(name = "wavectl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "WAVECTL_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the configured channels
    Channels,

    /// Run the monitoring loop
    Monitor(MonitorArgs),

    /// Measure auto-exposure parameters for one channel
    AutoExpo {
        /// Fiber switch channel (1-16)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=16))]
        channel: u8,
    },

    /// Reset a channel's DAC output to midscale
    DacReset {
        /// Fiber switch channel (1-16)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=16))]
        channel: u8,
    },

    /// Convert legacy dashboard channel settings (JSON) to TOML
    ImportChannels {
        /// Path to the legacy JSON settings file
        path: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the monitor command
#[derive(Parser, Debug)]
pub struct MonitorArgs {
    /// Stop after this many seconds (default: run until interrupted)
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Only monitor these channels, overriding the config file flags
    #[arg(long = "channel", value_name = "N")]
    pub channels: Vec<u8>,

    /// Use mock instruments instead of real hardware
    #[cfg(feature = "mock")]
    #[arg(long)]
    pub mock: bool,
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
    /// Compact single-line format
    Compact,
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
