//! Port abstraction layer for serial communication.
//!
//! Provides the `SerialPortAdapter` trait plus a hardware implementation and
//! a mock, so the session can be driven without a device attached.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::*;
pub use traits::*;
