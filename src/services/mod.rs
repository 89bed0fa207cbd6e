//! Control loop services
//!
//! The monitor owns the poll task; the pid module is its feedback step.

pub mod monitor;
pub mod pid;

pub use monitor::{Monitor, MonitorConfig};
pub use pid::PidOutcome;
