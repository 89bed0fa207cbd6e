//! Command handlers
//!
//! One module per subcommand. Handlers load the configuration, open the
//! instruments and drive the services.

pub mod auto_expo;
pub mod channels;
pub mod dac;
pub mod monitor;

pub use auto_expo::run_auto_expo;
pub use channels::{run_channels, run_import_channels};
pub use dac::run_dac_reset;
pub use monitor::run_monitor;

use crate::config::{Config, ConfigFile};
use crate::error::Result;
use crate::hardware::{SerialDac, SerialFiberSwitch, Ws7Wavemeter};

/// Load the configuration from an explicit path or the default locations
pub(crate) fn load_config(path: &Option<String>) -> Result<Config> {
    match path {
        Some(path) => Ok(ConfigFile::load(path)?),
        None => Ok(ConfigFile::load_default().unwrap_or_default()),
    }
}

/// Open the three instruments named in the configuration
pub(crate) fn open_devices(
    config: &Config,
) -> Result<(Ws7Wavemeter, SerialFiberSwitch, SerialDac)> {
    let wavemeter = Ws7Wavemeter::load(&config.devices.wavemeter_lib)?;
    let switch = SerialFiberSwitch::open(&config.devices.fiberswitch_port)?;
    let dac = SerialDac::open(&config.devices.dac_port)?;
    Ok((wavemeter, switch, dac))
}
