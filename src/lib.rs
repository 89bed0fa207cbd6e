//! wavectl - wavemeter channel monitoring and laser-lock library
//!
//! Core functionality for polling fiber-switched channels on a HighFinesse
//! wavemeter, tracking per-channel alerts and holding lasers on their
//! setpoints through a serial DAC.
//!
//! # Modules
//!
//! - [`alerts`]: Per-channel alert catalog and coordination engine
//! - [`cli`]: Command-line interface definitions
//! - [`commands`]: Command handlers
//! - [`config`]: Configuration system
//! - [`domain`]: Domain models with validation
//! - [`error`]: Error types
//! - [`events`]: Monitor event delivery
//! - [`hardware`]: Instrument drivers behind device traits
//! - [`services`]: Control loop and PID feedback

pub mod alerts;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod hardware;
pub mod services;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{AppError, Result};
