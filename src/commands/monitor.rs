//! Monitor command implementation
//!
//! Builds the monitor from the configuration and runs the poll loop in the
//! foreground, logging events until the duration expires or the task
//! faults.

use crate::alerts::AlertEngine;
use crate::cli::args::MonitorArgs;
use crate::commands::{load_config, open_devices};
use crate::config::Config;
use crate::error::Result;
use crate::events::{EventBus, LogSink, Subscription};
use crate::hardware::{Dac, FiberSwitch, Wavemeter};
use crate::services::Monitor;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Execute the monitor command
pub fn run_monitor(args: &MonitorArgs, config_path: &Option<String>) -> Result<()> {
    let config = load_config(config_path)?;

    #[cfg(feature = "mock")]
    if args.mock {
        use crate::domain::Frequency;
        use crate::mock::{MockDac, MockFiberSwitch, MockWavemeter};
        log::warn!("running against mock instruments");
        let wavemeter = MockWavemeter::with_frequency(Frequency::from_thz(384.2281));
        return run_with(wavemeter, MockFiberSwitch::new(), MockDac::new(), &config, args);
    }

    let (wavemeter, switch, dac) = open_devices(&config)?;
    run_with(wavemeter, switch, dac, &config, args)
}

fn run_with<W, S, D>(
    wavemeter: W,
    switch: S,
    dac: D,
    config: &Config,
    args: &MonitorArgs,
) -> Result<()>
where
    W: Wavemeter + 'static,
    S: FiberSwitch + 'static,
    D: Dac + 'static,
{
    let bus = Arc::new(EventBus::new());
    bus.subscribe(Arc::new(LogSink), Subscription::default());
    let engine = Arc::new(AlertEngine::new(Arc::clone(&bus)));
    let monitor = Monitor::new(
        wavemeter,
        switch,
        dac,
        engine,
        bus,
        config.monitor.to_monitor_config(),
    );

    let channels = config.to_channels()?;
    if channels.is_empty() {
        log::warn!("no channels configured, nothing to monitor");
        return Ok(());
    }
    let mut any_enabled = false;
    for (channel_config, startup_enabled) in channels {
        let number = channel_config.channel.get();
        let enabled = if args.channels.is_empty() {
            startup_enabled
        } else {
            args.channels.contains(&number)
        };
        let channel = monitor.add_channel(channel_config)?;
        channel.set_monitor_enabled(enabled);
        any_enabled |= enabled;
    }
    if !any_enabled {
        log::warn!("no channels enabled for monitoring");
        return Ok(());
    }

    monitor.start_monitoring()?;
    match args.duration {
        Some(seconds) => {
            thread::sleep(Duration::from_secs(seconds));
            monitor.stop_monitoring();
        }
        None => {
            // Run until the poll task exits; a fault is the only way out
            while monitor.is_monitoring() {
                thread::sleep(Duration::from_millis(500));
            }
        }
    }
    Ok(())
}
