//! Serial instrument drivers
//!
//! Both the fiber switch and the DAC speak a line-oriented ASCII protocol at
//! 57600 baud. Commands are newline-terminated; replies are single lines.

use crate::domain::ChannelId;
use crate::error::{DacError, SwitchError};
use crate::hardware::traits::{Dac, FiberSwitch};
use serialport::SerialPort;
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

const BAUD_RATE: u32 = 57_600;
const PORT_TIMEOUT: Duration = Duration::from_millis(500);

/// DAC output range in counts
pub const DAC_MIN: f64 = 0.0;
pub const DAC_MAX: f64 = 32_000.0;

fn open_port(path: &str) -> std::io::Result<Box<dyn SerialPort>> {
    serialport::new(path, BAUD_RATE)
        .timeout(PORT_TIMEOUT)
        .open()
        .map_err(|e| std::io::Error::other(e.to_string()))
}

fn read_line(reader: &mut impl BufRead) -> std::io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Fiber switch on a serial port
///
/// `ch<n>` selects a port, `ch?` reads the selected port back.
pub struct SerialFiberSwitch {
    port: BufReader<Box<dyn SerialPort>>,
}

impl SerialFiberSwitch {
    /// Open the switch on the given serial device
    pub fn open(path: &str) -> Result<Self, SwitchError> {
        let port = open_port(path).map_err(|e| SwitchError::Port(e.to_string()))?;
        log::debug!("fiber switch opened on {}", path);
        Ok(Self {
            port: BufReader::new(port),
        })
    }

    fn command(&mut self, cmd: &str) -> Result<String, SwitchError> {
        self.port
            .get_mut()
            .write_all(cmd.as_bytes())
            .map_err(|e| SwitchError::Port(e.to_string()))?;
        read_line(&mut self.port).map_err(|e| SwitchError::Port(e.to_string()))
    }
}

impl FiberSwitch for SerialFiberSwitch {
    fn switch_channel(&mut self, channel: ChannelId) -> Result<(), SwitchError> {
        self.command(&format!("ch{}\n", channel.get()))?;
        let reply = self.command("ch?\n")?;
        let actual: u8 = reply
            .trim_start_matches("ch")
            .parse()
            .map_err(|_| SwitchError::Protocol(format!("unparseable readback {reply:?}")))?;
        if actual != channel.get() {
            return Err(SwitchError::ReadbackMismatch {
                requested: channel.get(),
                actual,
            });
        }
        Ok(())
    }
}

/// Multichannel DAC on a serial port
///
/// `Q <ch>` queries the output, `S <ch> <counts>` sets it, `R <ch>` resets
/// the channel to midscale.
pub struct SerialDac {
    port: BufReader<Box<dyn SerialPort>>,
}

impl SerialDac {
    /// Open the DAC on the given serial device
    pub fn open(path: &str) -> Result<Self, DacError> {
        let port = open_port(path).map_err(|e| DacError::Port(e.to_string()))?;
        log::debug!("dac opened on {}", path);
        Ok(Self {
            port: BufReader::new(port),
        })
    }

    fn command(&mut self, cmd: &str) -> Result<String, DacError> {
        self.port
            .get_mut()
            .write_all(cmd.as_bytes())
            .map_err(|e| DacError::Port(e.to_string()))?;
        read_line(&mut self.port).map_err(|e| DacError::Port(e.to_string()))
    }
}

impl Dac for SerialDac {
    fn get_dac_value(&mut self, channel: u8) -> Result<f64, DacError> {
        let reply = self.command(&format!("Q {channel}\n"))?;
        reply
            .parse()
            .map_err(|_| DacError::Protocol(format!("unparseable value {reply:?}")))
    }

    fn set_dac_value(&mut self, channel: u8, value: f64) -> Result<(), DacError> {
        let clamped = value.clamp(DAC_MIN, DAC_MAX);
        self.command(&format!("S {} {}\n", channel, clamped.round() as u32))?;
        if clamped != value {
            return Err(DacError::OutOfBound {
                requested: value,
                min: DAC_MIN,
                max: DAC_MAX,
            });
        }
        Ok(())
    }

    fn reset_dac(&mut self, channel: u8) -> Result<(), DacError> {
        self.command(&format!("R {channel}\n"))?;
        Ok(())
    }
}
