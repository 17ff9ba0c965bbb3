//! Half-duplex serial session.
//!
//! A [`HalfDuplexSession`] owns one serial connection, points the RS-485
//! transceiver with [`Direction`], and reads carriage-return terminated lines
//! or writes raw bytes. The session is closed on every exit path: explicitly
//! with [`HalfDuplexSession::close`], from another thread through a
//! [`CloseHandle`], or implicitly on drop.
//!
//! ```
//! use rs485_link::port::MockSerialPort;
//! use rs485_link::session::{Direction, HalfDuplexSession, SessionConfig};
//!
//! let mut device = MockSerialPort::new("MOCK0");
//! device.enqueue_read(b"hello\r");
//!
//! let mut session = HalfDuplexSession::from_adapter(device, SessionConfig::new("MOCK0", 9600));
//! session.set_direction(Direction::Receive)?;
//! assert_eq!(session.read_line()?, "hello");
//! session.close();
//! # Ok::<(), rs485_link::session::SessionError>(())
//! ```

mod direction;
mod error;
mod line_buffer;

pub use direction::Direction;
pub use error::{SessionError, SessionResult};
pub use line_buffer::{LineBuffer, LINE_TERMINATOR, MAX_PENDING};

use crate::port::{PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Size of a single read from the device.
const READ_CHUNK: usize = 256;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parameters for opening a session. Framing is always 8N1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub port_name: String,
    pub baud_rate: u32,
    /// `None` blocks [`HalfDuplexSession::read_line`] until a line arrives.
    pub read_timeout: Option<Duration>,
    /// How often a blocked read checks for an out-of-band close.
    pub poll_interval: Duration,
}

impl SessionConfig {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// OS-level port parameters; each OS read waits at most one poll interval.
    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration::new(self.baud_rate, self.poll_interval)
    }
}

/// Counters kept for the lifetime of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub lines_read: u64,
    pub bytes_written: u64,
}

/// Requests a close from outside the thread that owns the session.
///
/// Closing through the handle releases the port right away, or once a read
/// already in progress on another thread returns (at most one poll
/// interval). The owning thread then sees [`SessionError::Closed`].
#[derive(Clone)]
pub struct CloseHandle {
    flag: Arc<AtomicBool>,
    release: Arc<dyn Fn() + Send + Sync>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.flag.store(true, Ordering::Release);
        (self.release)();
    }

    pub fn is_closed(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One exclusively owned serial connection driven in half-duplex.
#[derive(Debug)]
pub struct HalfDuplexSession<P: SerialPortAdapter = SyncSerialPort> {
    /// Shared with [`CloseHandle`]s so they can release the device.
    port: Arc<Mutex<Option<P>>>,
    config: SessionConfig,
    direction: Option<Direction>,
    buffer: LineBuffer,
    close_requested: Arc<AtomicBool>,
    stats: SessionStats,
}

impl HalfDuplexSession<SyncSerialPort> {
    /// Open the named device at the configured baud rate, 8N1.
    ///
    /// Fails with [`SessionError::Connection`] if the device is missing,
    /// busy, not permitted or rejects the baud rate. Nothing is retried.
    pub fn open(config: SessionConfig) -> SessionResult<Self> {
        let connection_error = |source: PortError| {
            warn!(port = %config.port_name, error = %source, "open failed");
            SessionError::Connection {
                port: config.port_name.clone(),
                source,
            }
        };

        let mut port = SyncSerialPort::open(&config.port_name, &config.port_configuration())
            .map_err(connection_error)?;
        // Bytes the driver buffered before we opened are not ours.
        port.clear_buffers().map_err(connection_error)?;

        info!(port = %port.name(), baud = config.baud_rate, "session opened");
        Ok(Self::from_adapter(port, config))
    }
}

impl<P: SerialPortAdapter> HalfDuplexSession<P> {
    /// Wrap an already-open adapter.
    pub fn from_adapter(port: P, config: SessionConfig) -> Self {
        Self {
            port: Arc::new(Mutex::new(Some(port))),
            config,
            direction: None,
            buffer: LineBuffer::new(),
            close_requested: Arc::new(AtomicBool::new(false)),
            stats: SessionStats::default(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn port_name(&self) -> &str {
        &self.config.port_name
    }

    pub fn is_open(&self) -> bool {
        !self.close_requested.load(Ordering::Acquire) && self.port.lock().is_some()
    }

    /// Current direction; `None` before the first [`set_direction`](Self::set_direction)
    /// and after close.
    pub fn direction(&self) -> Option<Direction> {
        if self.is_open() {
            self.direction
        } else {
            None
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn close_handle(&self) -> CloseHandle
    where
        P: 'static,
    {
        let slot = Arc::clone(&self.port);
        let port_name = self.config.port_name.clone();
        CloseHandle {
            flag: Arc::clone(&self.close_requested),
            release: Arc::new(move || {
                if slot.lock().take().is_some() {
                    info!(port = %port_name, "session closed through handle");
                }
            }),
        }
    }

    /// Point the transceiver. A partially received line is kept, so a line
    /// that spans a transmit round trip still arrives whole.
    pub fn set_direction(&mut self, direction: Direction) -> SessionResult<()> {
        let level = direction.line_level();
        if let Err(e) = self.with_port(|port| port.set_control_lines(level))? {
            warn!(port = %self.config.port_name, error = %e, "control lines failed, closing");
            self.close();
            return Err(SessionError::Port(e));
        }

        self.direction = Some(direction);
        debug!(port = %self.config.port_name, %direction, "direction set");
        Ok(())
    }

    /// Block until the next carriage-return terminated line arrives and
    /// return it without the terminator, decoded as UTF-8 (lossy).
    ///
    /// Returns early with [`SessionError::ReadTimeout`] when a read timeout
    /// is configured, or [`SessionError::Closed`] when the session is closed
    /// through a [`CloseHandle`].
    pub fn read_line(&mut self) -> SessionResult<String> {
        self.read_line_bytes().map(decode)
    }

    /// Like [`read_line`](Self::read_line) but returns the raw bytes.
    pub fn read_line_bytes(&mut self) -> SessionResult<Vec<u8>> {
        let started = Instant::now();
        loop {
            if let Some(line) = self.try_read_line_bytes()? {
                return Ok(line);
            }
            if let Some(limit) = self.config.read_timeout {
                if started.elapsed() >= limit {
                    debug!(port = %self.config.port_name, ?limit, "read timed out");
                    return Err(SessionError::ReadTimeout(limit));
                }
            }
        }
    }

    /// Wait at most one poll interval for a complete line.
    ///
    /// Lets a caller interleave reads with other work, such as the console
    /// releasing its lock between polls.
    pub fn try_read_line(&mut self) -> SessionResult<Option<String>> {
        Ok(self.try_read_line_bytes()?.map(decode))
    }

    pub fn try_read_line_bytes(&mut self) -> SessionResult<Option<Vec<u8>>> {
        self.with_port(|_| ())?;
        self.require(Direction::Receive)?;

        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        let mut chunk = [0u8; READ_CHUNK];
        match self.with_port(|port| port.read_bytes(&mut chunk))? {
            Ok(n) => {
                if n > 0 {
                    trace!(port = %self.config.port_name, bytes = n, "received");
                }
                let dropped = self.buffer.extend(&chunk[..n]);
                if dropped > 0 {
                    warn!(
                        port = %self.config.port_name,
                        dropped,
                        limit = MAX_PENDING,
                        "no terminator within limit, partial line discarded"
                    );
                }
                Ok(self.take_line())
            }
            Err(e) => {
                warn!(port = %self.config.port_name, error = %e, "read failed, closing");
                self.close();
                Err(SessionError::Port(e))
            }
        }
    }

    /// Send `bytes` verbatim and flush.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> SessionResult<()> {
        if self.with_port(|_| ()).is_err() {
            return Err(SessionError::WriteClosed);
        }
        self.require(Direction::Transmit)?;

        let result = self
            .with_port(|port| port.write_bytes(bytes).and_then(|_| port.flush()))
            .map_err(|_| SessionError::WriteClosed)?;
        if let Err(e) = result {
            warn!(port = %self.config.port_name, error = %e, "write failed, closing");
            self.close();
            return Err(SessionError::Write(e));
        }

        self.stats.bytes_written += bytes.len() as u64;
        trace!(port = %self.config.port_name, bytes = bytes.len(), "sent");
        Ok(())
    }

    /// Send `text` followed by the line terminator.
    pub fn write_line(&mut self, text: &str) -> SessionResult<()> {
        let mut frame = Vec::with_capacity(text.len() + 1);
        frame.extend_from_slice(text.as_bytes());
        frame.push(LINE_TERMINATOR);
        self.write_bytes(&frame)
    }

    /// Release the device. Safe to call any number of times.
    pub fn close(&mut self) {
        self.close_requested.store(true, Ordering::Release);
        self.direction = None;
        self.buffer.clear();
        let released = self.port.lock().take();
        if released.is_some() {
            drop(released);
            info!(
                port = %self.config.port_name,
                lines_read = self.stats.lines_read,
                bytes_written = self.stats.bytes_written,
                "session closed"
            );
        }
    }

    /// Run `op` on the open port, honouring a pending out-of-band close.
    fn with_port<T>(&mut self, op: impl FnOnce(&mut P) -> T) -> SessionResult<T> {
        if self.close_requested.load(Ordering::Acquire) {
            self.close();
            return Err(SessionError::Closed);
        }
        let mut slot = self.port.lock();
        slot.as_mut().map(op).ok_or(SessionError::Closed)
    }

    fn require(&self, expected: Direction) -> SessionResult<()> {
        match self.direction {
            None => Err(SessionError::DirectionNotSet),
            Some(actual) if actual != expected => {
                Err(SessionError::WrongDirection { expected, actual })
            }
            Some(_) => Ok(()),
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let line = self.buffer.next_line()?;
        self.stats.lines_read += 1;
        Some(line)
    }
}

fn decode(line: Vec<u8>) -> String {
    match String::from_utf8(line) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

impl<P: SerialPortAdapter> Drop for HalfDuplexSession<P> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{LineLevel, MockSerialPort, PortError};
    use pretty_assertions::assert_eq;
    use std::thread;

    fn session_with(device: &MockSerialPort) -> HalfDuplexSession<MockSerialPort> {
        let config = SessionConfig::new("MOCK0", 9600).with_poll_interval(Duration::from_millis(2));
        HalfDuplexSession::from_adapter(device.clone(), config)
    }

    #[test]
    fn opens_with_direction_unset() {
        let device = MockSerialPort::new("MOCK0");
        let session = session_with(&device);
        assert!(session.is_open());
        assert_eq!(session.direction(), None);
        assert!(device.line_history().is_empty());
    }

    #[test]
    fn direction_drives_both_lines_together() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);

        session.set_direction(Direction::Receive).unwrap();
        session.set_direction(Direction::Transmit).unwrap();

        assert_eq!(
            device.line_history(),
            vec![LineLevel::Asserted, LineLevel::Deasserted]
        );
        assert_eq!(session.direction(), Some(Direction::Transmit));
    }

    #[test]
    fn read_and_write_require_direction() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);

        assert!(matches!(
            session.write_bytes(b"A"),
            Err(SessionError::DirectionNotSet)
        ));
        assert!(matches!(
            session.try_read_line(),
            Err(SessionError::DirectionNotSet)
        ));
    }

    #[test]
    fn write_rejected_in_receive() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.set_direction(Direction::Receive).unwrap();

        let err = session.write_bytes(b"A").unwrap_err();
        assert!(matches!(
            err,
            SessionError::WrongDirection {
                expected: Direction::Transmit,
                actual: Direction::Receive
            }
        ));
        assert!(device.get_write_log().is_empty());
    }

    #[test]
    fn read_rejected_in_transmit() {
        let mut device = MockSerialPort::new("MOCK0");
        device.enqueue_read(b"x\r");
        let mut session = session_with(&device);
        session.set_direction(Direction::Transmit).unwrap();

        assert!(matches!(
            session.read_line(),
            Err(SessionError::WrongDirection {
                expected: Direction::Receive,
                actual: Direction::Transmit
            })
        ));
        assert_eq!(device.available_bytes(), 2);
    }

    #[test]
    fn read_line_strips_terminator_once() {
        let mut device = MockSerialPort::new("MOCK0");
        device.enqueue_read(b"hello\r");
        let mut session = session_with(&device);
        session.set_direction(Direction::Receive).unwrap();

        assert_eq!(session.read_line().unwrap(), "hello");
        assert_eq!(session.try_read_line().unwrap(), None);
        assert_eq!(session.stats().lines_read, 1);
    }

    #[test]
    fn several_lines_in_one_chunk() {
        let mut device = MockSerialPort::new("MOCK0");
        device.enqueue_read(b"one\rtwo\rthr");
        let mut session = session_with(&device);
        session.set_direction(Direction::Receive).unwrap();

        assert_eq!(session.read_line().unwrap(), "one");
        assert_eq!(session.read_line().unwrap(), "two");
        assert_eq!(session.try_read_line().unwrap(), None);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut device = MockSerialPort::new("MOCK0");
        device.enqueue_read(b"ok\xff\r");
        let mut session = session_with(&device);
        session.set_direction(Direction::Receive).unwrap();

        assert_eq!(session.read_line().unwrap(), "ok\u{fffd}");
    }

    #[test]
    fn raw_line_keeps_bytes() {
        let mut device = MockSerialPort::new("MOCK0");
        device.enqueue_read(b"\x01\xfe\n\r");
        let mut session = session_with(&device);
        session.set_direction(Direction::Receive).unwrap();

        assert_eq!(session.read_line_bytes().unwrap(), b"\x01\xfe\n");
    }

    #[test]
    fn read_timeout_is_optional() {
        let device = MockSerialPort::new("MOCK0");
        let config = SessionConfig::new("MOCK0", 9600)
            .with_poll_interval(Duration::from_millis(2))
            .with_read_timeout(Some(Duration::from_millis(20)));
        let mut session = HalfDuplexSession::from_adapter(device, config);
        session.set_direction(Direction::Receive).unwrap();

        let err = session.read_line().unwrap_err();
        assert!(matches!(err, SessionError::ReadTimeout(d) if d == Duration::from_millis(20)));
        assert!(session.is_open());
    }

    #[test]
    fn partial_line_survives_transmit_round_trip() {
        let mut device = MockSerialPort::new("MOCK0");
        device.enqueue_read(b"hel");
        let mut session = session_with(&device);
        session.set_direction(Direction::Receive).unwrap();
        assert_eq!(session.try_read_line().unwrap(), None);

        session.set_direction(Direction::Transmit).unwrap();
        session.write_line("ping").unwrap();
        session.set_direction(Direction::Receive).unwrap();
        device.enqueue_read(b"lo\r");

        assert_eq!(session.read_line().unwrap(), "hello");
        assert_eq!(device.written_bytes(), b"ping\r".to_vec());
    }

    #[test]
    fn control_line_failure_closes_session() {
        let mut device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        device.disconnect();

        let err = session.set_direction(Direction::Receive).unwrap_err();
        assert!(matches!(err, SessionError::Port(PortError::Disconnected(_))));
        assert!(!session.is_open());
        assert_eq!(session.direction(), None);
        assert_eq!(device.handle_count(), 1);
    }

    #[test]
    fn close_handle_releases_port_immediately() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.set_direction(Direction::Transmit).unwrap();

        let handle = session.close_handle();
        handle.close();
        assert_eq!(device.handle_count(), 1);
        assert!(!session.is_open());
        assert!(matches!(
            session.write_bytes(b"A"),
            Err(SessionError::WriteClosed)
        ));
    }

    #[test]
    fn writes_in_program_order() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.set_direction(Direction::Transmit).unwrap();

        for byte in [b"A", b"B", b"C"] {
            session.write_bytes(byte).unwrap();
        }
        session.close();

        assert_eq!(
            device.get_write_log(),
            vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]
        );
        assert_eq!(device.flush_count(), 3);
        assert_eq!(device.handle_count(), 1);
    }

    #[test]
    fn write_line_appends_carriage_return() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.set_direction(Direction::Transmit).unwrap();
        session.write_line("test1").unwrap();

        assert_eq!(device.written_bytes(), b"test1\r");
        assert_eq!(session.stats().bytes_written, 6);
    }

    #[test]
    fn close_is_idempotent() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.close();
        session.close();

        assert!(!session.is_open());
        assert_eq!(session.direction(), None);
        assert_eq!(device.handle_count(), 1);
    }

    #[test]
    fn write_after_close_is_write_error() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.set_direction(Direction::Transmit).unwrap();
        session.close();

        assert!(matches!(
            session.write_bytes(b"A"),
            Err(SessionError::WriteClosed)
        ));
        assert!(matches!(
            session.set_direction(Direction::Receive),
            Err(SessionError::Closed)
        ));
    }

    #[test]
    fn unplugged_device_fails_write_and_closes() {
        let mut device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.set_direction(Direction::Transmit).unwrap();
        device.disconnect();

        let err = session.write_bytes(b"A").unwrap_err();
        assert!(matches!(err, SessionError::Write(PortError::Disconnected(_))));
        assert!(!session.is_open());
    }

    #[test]
    fn unplugged_device_fails_read() {
        let mut device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.set_direction(Direction::Receive).unwrap();
        device.disconnect();

        assert!(matches!(session.read_line(), Err(SessionError::Port(_))));
        assert!(!session.is_open());
    }

    #[test]
    fn close_handle_unblocks_pending_read() {
        let device = MockSerialPort::new("MOCK0");
        let mut session = session_with(&device);
        session.set_direction(Direction::Receive).unwrap();
        let handle = session.close_handle();

        let reader = thread::spawn(move || {
            let result = session.read_line();
            (result, session.is_open())
        });
        thread::sleep(Duration::from_millis(20));
        handle.close();

        let (result, open) = reader.join().unwrap();
        assert!(matches!(result, Err(SessionError::Closed)));
        assert!(!open);
        assert!(handle.is_closed());
        assert_eq!(device.handle_count(), 1);
    }

    #[test]
    fn drop_releases_port() {
        let device = MockSerialPort::new("MOCK0");
        {
            let _session = session_with(&device);
            assert_eq!(device.handle_count(), 2);
        }
        assert_eq!(device.handle_count(), 1);
    }
}
