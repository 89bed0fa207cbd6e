//! Hardware abstraction traits
//!
//! Device access goes through these traits so the control loop can be tested
//! against mocks and so each instrument family (wavemeter library, serial
//! switch firmware, serial DAC firmware) stays swappable. Implementations
//! must be `Send`: the poll task owns the devices on its own thread.

use crate::domain::{ChannelId, Frequency};
use crate::error::{DacError, SwitchError, WavemeterError};

/// A multichannel wavelength meter
pub trait Wavemeter: Send {
    /// Measure the frequency of whatever is currently fed into the
    /// interferometer
    fn frequency(&mut self) -> Result<Frequency, WavemeterError>;

    /// Set the exposure times of both CCD arrays, in ms
    fn set_exposure(&mut self, expo: u32, expo2: u32) -> Result<(), WavemeterError>;

    /// Read back the current exposure times of both CCD arrays, in ms
    fn exposure(&mut self) -> Result<(u32, u32), WavemeterError>;

    /// Enable or disable the instrument's automatic exposure control
    fn set_auto_exposure(&mut self, enabled: bool) -> Result<(), WavemeterError>;

    /// Fetch the next interferometer pattern trace
    ///
    /// `wide` selects the second, wider interferometer. Returns `None` when
    /// the instrument has no new trace ready.
    fn next_pattern(&mut self, wide: bool) -> Result<Option<Vec<u16>>, WavemeterError>;
}

/// A fiber switch multiplexing channels into the wavemeter
pub trait FiberSwitch: Send {
    /// Route the given channel to the output, verifying by readback
    fn switch_channel(&mut self, channel: ChannelId) -> Result<(), SwitchError>;
}

/// A multichannel DAC driving laser piezo inputs
pub trait Dac: Send {
    /// Read back the current output of a DAC channel, in counts
    fn get_dac_value(&mut self, channel: u8) -> Result<f64, DacError>;

    /// Drive a DAC channel, in counts
    ///
    /// Out-of-range requests are clamped to the nearest rail before the
    /// write, then reported as [`DacError::OutOfBound`] so the caller can
    /// flag the saturation.
    fn set_dac_value(&mut self, channel: u8, value: f64) -> Result<(), DacError>;

    /// Reset a DAC channel to its midpoint
    fn reset_dac(&mut self, channel: u8) -> Result<(), DacError>;
}
