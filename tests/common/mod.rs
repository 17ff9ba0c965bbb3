//! Shared helpers for the integration tests.

#![allow(dead_code)]

use rs485_link::port::MockSerialPort;
use rs485_link::session::{HalfDuplexSession, SessionConfig};
use std::time::Duration;

/// Short poll so blocked reads notice a close quickly.
pub const TEST_POLL: Duration = Duration::from_millis(5);

pub fn test_config(port_name: &str) -> SessionConfig {
    SessionConfig::new(port_name, 9600).with_poll_interval(TEST_POLL)
}

/// Session over a clone of `device`; the caller keeps `device` to feed and
/// inspect the mock.
pub fn mock_session(device: &MockSerialPort, port_name: &str) -> HalfDuplexSession<MockSerialPort> {
    HalfDuplexSession::from_adapter(device.clone(), test_config(port_name))
}

/// Create a mock serial port with pre-programmed bytes to read.
pub fn create_mock_port_with_responses(port_name: &str, responses: &[&[u8]]) -> MockSerialPort {
    let mut mock = MockSerialPort::new(port_name);
    for response in responses {
        mock.enqueue_read(response);
    }
    mock
}

pub fn output_text(buf: Vec<u8>) -> String {
    String::from_utf8(buf).expect("console output is UTF-8")
}
