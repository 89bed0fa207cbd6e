//! Command-line interface
//!
//! Argument parsing with clap derive and output formatting.

pub mod args;
pub mod output;

pub use args::{Cli, Commands, OutputFormat};
