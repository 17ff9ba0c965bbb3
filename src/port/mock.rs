//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates serial port behavior without
//! requiring actual hardware. Clones share state, so a test can keep one
//! handle while the session owns another.

use super::error::PortError;
use super::traits::{LineLevel, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Inner state of the mock port.
#[derive(Debug, Default)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all writes, one entry per `write_bytes` call.
    write_log: Vec<Vec<u8>>,
    /// Every control-line level applied, in order.
    line_history: Vec<LineLevel>,
    /// How long an empty read waits before returning zero bytes.
    read_delay: Duration,
    /// Simulates the device being unplugged.
    disconnected: bool,
    /// Number of flush calls.
    flushes: usize,
}

/// Mock serial port implementation for testing.
///
/// - Enqueue data to be returned by read operations
/// - Inspect what data was written and which control levels were applied
/// - Simulate a device disappearing mid-session
/// - Wire two ports back to back with [`MockSerialPort::pair`]
///
/// # Example
/// ```
/// use rs485_link::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello\r");
///
/// let mut buffer = [0u8; 16];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello\r");
///
/// port.write_bytes(b"A").unwrap();
/// assert_eq!(port.get_write_log(), vec![b"A".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
    /// Read queue of the other end when wired as a loopback pair.
    peer: Option<Arc<Mutex<MockPortState>>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                read_delay: Duration::from_millis(2),
                ..Default::default()
            })),
            peer: None,
        }
    }

    /// Create two ports wired back to back: bytes written on one show up in
    /// the read queue of the other.
    pub fn pair(a: impl Into<String>, b: impl Into<String>) -> (Self, Self) {
        let mut left = Self::new(a);
        let mut right = Self::new(b);
        left.peer = Some(Arc::clone(&right.state));
        right.peer = Some(Arc::clone(&left.state));
        (left, right)
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// All written bytes concatenated in write order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state.lock().write_log.concat()
    }

    /// Control-line levels applied so far, oldest first.
    pub fn line_history(&self) -> Vec<LineLevel> {
        self.state.lock().line_history.clone()
    }

    /// The most recently applied control-line level.
    pub fn current_lines(&self) -> Option<LineLevel> {
        self.state.lock().line_history.last().copied()
    }

    /// Make every later read and write fail as if the device was unplugged.
    pub fn disconnect(&mut self) {
        self.state.lock().disconnected = true;
    }

    /// Set how long an empty read waits before returning zero bytes.
    pub fn set_read_delay(&mut self, delay: Duration) {
        self.state.lock().read_delay = delay;
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().flushes
    }

    /// Number of live handles sharing this port's state, this one included.
    ///
    /// Drops back to one once a session holding a clone releases it.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.state)
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        {
            let mut state = self.state.lock();
            if state.disconnected {
                return Err(PortError::disconnected(self.name.clone()));
            }
            state.write_log.push(data.to_vec());
        }

        if let Some(peer) = &self.peer {
            peer.lock().read_queue.extend(data);
        }

        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(PortError::disconnected(self.name.clone()));
        }
        state.flushes += 1;
        Ok(())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let delay = {
            let mut state = self.state.lock();
            if state.disconnected {
                return Err(PortError::disconnected(self.name.clone()));
            }

            let mut bytes_read = 0;
            for byte in buffer.iter_mut() {
                match state.read_queue.pop_front() {
                    Some(queued) => {
                        *byte = queued;
                        bytes_read += 1;
                    }
                    None => break,
                }
            }
            if bytes_read > 0 {
                return Ok(bytes_read);
            }
            state.read_delay
        };

        // Behave like a port whose read timeout expired with nothing on the wire.
        std::thread::sleep(delay);
        Ok(0)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_control_lines(&mut self, level: LineLevel) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(PortError::disconnected(self.name.clone()));
        }
        state.line_history.push(level);
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        self.state.lock().read_queue.clear();
        Ok(())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .field("paired", &self.peer.is_some())
            .finish()
    }
}
