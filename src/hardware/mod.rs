//! Instrument drivers
//!
//! Traits first, concrete drivers behind them: the WS7 wavemeter through
//! the vendor library, and the fiber switch and DAC over serial.

pub mod serial;
pub mod traits;
pub mod ws7;

pub use serial::{SerialDac, SerialFiberSwitch, DAC_MAX, DAC_MIN};
pub use traits::{Dac, FiberSwitch, Wavemeter};
pub use ws7::Ws7Wavemeter;
