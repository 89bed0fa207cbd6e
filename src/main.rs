//! wavectl - wavemeter channel monitor and laser-lock controller
//!
//! A command-line tool for polling fiber-switched channels on a HighFinesse
//! wavemeter and holding lasers on their setpoints through a serial DAC.

use clap::Parser;
use wavectl::cli::args::{generate_completions, Cli, Commands};
use wavectl::commands::{
    run_auto_expo, run_channels, run_dac_reset, run_import_channels, run_monitor,
};
use wavectl::error::AppError;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Set log level based on verbose flag
    if cli.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }

    // Run the appropriate command
    let result = run(&cli);

    if let Err(e) = result {
        log::error!("{}", e);
        print_error(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    match &cli.command {
        Commands::Channels => run_channels(&cli.config, cli.format),

        Commands::Monitor(args) => run_monitor(args, &cli.config),

        Commands::AutoExpo { channel } => run_auto_expo(*channel, &cli.config, cli.format),

        Commands::DacReset { channel } => run_dac_reset(*channel, &cli.config),

        Commands::ImportChannels { path } => run_import_channels(path),

        Commands::Completions { shell } => {
            generate_completions(*shell);
            Ok(())
        }
    }
}

fn print_error(err: &AppError) {
    eprintln!("Error: {}", err);

    // Print helpful hints for common errors
    match err {
        AppError::Wavemeter(wavectl::error::WavemeterError::LibraryNotFound(_)) => {
            eprintln!();
            eprintln!("Hint: Set devices.wavemeter_lib in the config file to the");
            eprintln!("      wlmData library shipped with the wavemeter software.");
        }
        AppError::Wavemeter(wavectl::error::WavemeterError::InstrumentMissing) => {
            eprintln!();
            eprintln!("Hint: Start the wavemeter server application first.");
        }
        AppError::Switch(wavectl::error::SwitchError::Port(_))
        | AppError::Dac(wavectl::error::DacError::Port(_)) => {
            eprintln!();
            eprintln!("Hint: Check the serial device paths in the config file and");
            eprintln!("      that your user can access them (dialout group on Linux).");
        }
        _ => {}
    }
}
