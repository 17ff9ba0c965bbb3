//! Core traits for serial port abstraction.
//!
//! Defines the `SerialPortAdapter` trait that lets the real serial port and
//! the mock be used interchangeably by the session.

use super::error::PortError;
use std::fmt;
use std::time::Duration;

/// Fixed byte framing used by every port in this crate: 8 data bits,
/// no parity, 1 stop bit, no flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    pub data_bits: serialport::DataBits,
    pub parity: serialport::Parity,
    pub stop_bits: serialport::StopBits,
    pub flow_control: serialport::FlowControl,
}

impl Framing {
    /// 8N1 without flow control.
    pub const EIGHT_N_ONE: Framing = Framing {
        data_bits: serialport::DataBits::Eight,
        parity: serialport::Parity::None,
        stop_bits: serialport::StopBits::One,
        flow_control: serialport::FlowControl::None,
    };
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data_bits = match self.data_bits {
            serialport::DataBits::Five => 5,
            serialport::DataBits::Six => 6,
            serialport::DataBits::Seven => 7,
            serialport::DataBits::Eight => 8,
        };
        let parity = match self.parity {
            serialport::Parity::None => 'N',
            serialport::Parity::Odd => 'O',
            serialport::Parity::Even => 'E',
        };
        let stop_bits = match self.stop_bits {
            serialport::StopBits::One => 1,
            serialport::StopBits::Two => 2,
        };
        write!(f, "{data_bits}{parity}{stop_bits}")
    }
}

/// Parameters used when opening a port.
#[derive(Debug, Clone)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Byte framing. Always [`Framing::EIGHT_N_ONE`] in this crate.
    pub framing: Framing,

    /// Timeout of a single OS read call. A read that sees no data within
    /// this window returns zero bytes rather than an error.
    pub timeout: Duration,
}

impl PortConfiguration {
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self {
            baud_rate,
            framing: Framing::EIGHT_N_ONE,
            timeout,
        }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self::new(9600, Duration::from_millis(100))
    }
}

/// Logic level applied to the RTS and DTR modem-control outputs.
///
/// Both lines always move together; the transceiver only has two valid
/// states, so there is no way to drive them independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Asserted,
    Deasserted,
}

impl LineLevel {
    pub fn is_asserted(self) -> bool {
        matches!(self, LineLevel::Asserted)
    }
}

impl fmt::Display for LineLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_asserted() { "1" } else { "0" })
    }
}

/// Trait for serial port I/O operations.
///
/// Implemented by the real hardware port and by [`MockSerialPort`](super::MockSerialPort).
pub trait SerialPortAdapter: Send + fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Block until buffered output has been handed to the device.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns `Ok(0)` when the per-call timeout expires without data.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Drive RTS and DTR to the same level.
    fn set_control_lines(&mut self, level: LineLevel) -> Result<(), PortError>;

    /// Discard any unread input and unsent output.
    fn clear_buffers(&mut self) -> Result<(), PortError>;
}

impl<P: SerialPortAdapter + ?Sized> SerialPortAdapter for Box<P> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        (**self).write_bytes(data)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        (**self).flush()
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        (**self).read_bytes(buffer)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_control_lines(&mut self, level: LineLevel) -> Result<(), PortError> {
        (**self).set_control_lines(level)
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        (**self).clear_buffers()
    }
}
