//! Optical frequency domain type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute optical frequency in Hz
///
/// The wavemeter reports THz; setpoints in config files are given in THz as
/// well. Internally everything is Hz.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Frequency(f64);

impl Frequency {
    /// Create a frequency from Hz
    pub const fn from_hz(hz: f64) -> Self {
        Self(hz)
    }

    /// Create a frequency from THz
    pub fn from_thz(thz: f64) -> Self {
        Self(thz * 1e12)
    }

    /// Get the frequency in Hz
    #[inline]
    pub const fn as_hz(&self) -> f64 {
        self.0
    }

    /// Get the frequency in THz
    #[inline]
    pub fn as_thz(&self) -> f64 {
        self.0 / 1e12
    }

    /// Signed distance to another frequency, in Hz
    pub fn error_to(&self, setpoint: Frequency) -> f64 {
        self.0 - setpoint.0
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} THz", self.as_thz())
    }
}
