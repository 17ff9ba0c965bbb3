//! Service layer: the receive, transmit and console loops.
//!
//! Each loop drives an already-open [`HalfDuplexSession`] and talks to the
//! user through caller-supplied readers and writers. Opening and closing the
//! session stays with the caller, so the session is released on every exit
//! path regardless of how a loop ends.
//!
//! ```text
//! main.rs ──> service::{run_receive, run_transmit, run_console} ──> HalfDuplexSession
//!                          │
//!                          └──> console (banner, prompts, rendering)
//! ```

use crate::console::{self, ConsoleError};
use crate::port::SerialPortAdapter;
use crate::session::{Direction, HalfDuplexSession, SessionError};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

// ========== Error Types ==========

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Console(#[from] ConsoleError),

    #[error("Console output failed: {0}")]
    Io(#[from] io::Error),
}

/// Convenient Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

// ========== Options and Summaries ==========

/// How received lines are shown.
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    /// Show length, escaped ASCII and UTF-8 views instead of the bare text.
    pub detailed: bool,
    /// Prefix each line with the local time.
    pub timestamps: bool,
    /// Stop after this many lines.
    pub max_lines: Option<u64>,
}

/// Why the receive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The session was closed, normally by Ctrl+C.
    Closed,
    /// The configured read timeout elapsed.
    TimedOut,
    /// `max_lines` lines were received.
    LimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiveSummary {
    pub lines: u64,
    pub stopped: StopReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransmitSummary {
    pub writes: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsoleSummary {
    pub sent: usize,
    pub received: u64,
}

// ========== Receive ==========

/// Point the transceiver at the bus and print every line that arrives.
///
/// Returns when the session is closed, the read timeout elapses or the line
/// limit is reached. Any other failure is returned as an error.
pub fn run_receive<P: SerialPortAdapter>(
    session: &mut HalfDuplexSession<P>,
    out: &mut impl Write,
    options: &ReceiveOptions,
) -> ServiceResult<ReceiveSummary> {
    session.set_direction(Direction::Receive)?;
    console::print_direction(out, Direction::Receive)?;
    writeln!(out, "\n\t  Waiting for data, press Ctrl+C to stop\n")?;
    out.flush()?;

    let mut lines = 0u64;
    let stopped = loop {
        if options.max_lines.is_some_and(|max| lines >= max) {
            break StopReason::LimitReached;
        }

        match session.read_line_bytes() {
            Ok(line) => {
                lines += 1;
                print_received(out, &line, options)?;
            }
            Err(SessionError::Closed) => break StopReason::Closed,
            Err(SessionError::ReadTimeout(limit)) => {
                writeln!(out, "\n\t  No data for {limit:?}, stopping")?;
                break StopReason::TimedOut;
            }
            Err(e) => return Err(e.into()),
        }
    };

    info!(lines, ?stopped, "receive finished");
    Ok(ReceiveSummary { lines, stopped })
}

fn print_received(out: &mut impl Write, line: &[u8], options: &ReceiveOptions) -> io::Result<()> {
    if options.timestamps {
        write!(out, "[{}] ", console::timestamp())?;
    }
    if options.detailed {
        writeln!(out, "\n{}", console::render_line(line))?;
    } else {
        writeln!(out, "\t {}", String::from_utf8_lossy(line))?;
    }
    out.flush()
}

// ========== Transmit ==========

/// Point the transceiver at the bus and write each payload entry in order.
///
/// With `step_through`, waits for Enter after every write; end of input
/// stops the pauses but not the writes.
pub fn run_transmit<P: SerialPortAdapter>(
    session: &mut HalfDuplexSession<P>,
    input: &mut impl BufRead,
    out: &mut impl Write,
    payload: &[String],
    step_through: bool,
) -> ServiceResult<TransmitSummary> {
    session.set_direction(Direction::Transmit)?;
    console::print_direction(out, Direction::Transmit)?;

    let mut summary = TransmitSummary::default();
    let mut pausing = step_through;
    for item in payload {
        session.write_bytes(item.as_bytes())?;
        summary.writes += 1;
        summary.bytes += item.len() as u64;
        writeln!(out, "\n\t  {item} written to {}", session.port_name())?;
        out.flush()?;

        if pausing && console::read_input(input)?.is_none() {
            debug!("input closed, no more pauses");
            pausing = false;
        }
    }

    info!(writes = summary.writes, bytes = summary.bytes, "transmit finished");
    Ok(summary)
}

// ========== Console ==========

/// Listen on the bus while sending each typed line (with a carriage return).
///
/// A background thread prints incoming lines. Sending takes the session
/// lock, flips the transceiver to transmit, writes, and flips it back, so
/// reads and writes never overlap. `quit` or end of input ends the loop.
pub fn run_console<P, W>(
    session: &mut HalfDuplexSession<P>,
    input: &mut impl BufRead,
    out: &mut W,
) -> ServiceResult<ConsoleSummary>
where
    P: SerialPortAdapter,
    W: Write + Send,
{
    session.set_direction(Direction::Receive)?;
    console::print_direction(out, Direction::Receive)?;
    writeln!(out, "\t  Type a line to send it, 'quit' to exit\n")?;

    let session = Mutex::new(session);
    let out = Mutex::new(out);
    let stop = AtomicBool::new(false);

    thread::scope(|scope| {
        let reader = scope.spawn(|| receive_until_stopped(&session, &out, &stop));

        let sent = send_typed_lines(&session, &out, input);
        stop.store(true, Ordering::Release);

        let received = match reader.join() {
            Ok(result) => result?,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        let sent = sent?;
        info!(sent, received, "console finished");
        Ok(ConsoleSummary { sent, received })
    })
}

fn receive_until_stopped<P: SerialPortAdapter, W: Write>(
    session: &Mutex<&mut HalfDuplexSession<P>>,
    out: &Mutex<&mut W>,
    stop: &AtomicBool,
) -> ServiceResult<u64> {
    let mut received = 0u64;
    while !stop.load(Ordering::Acquire) {
        let polled = session.lock().try_read_line_bytes();
        match polled {
            Ok(Some(line)) => {
                received += 1;
                let mut out = out.lock();
                writeln!(out, "\n[{}] {}", console::timestamp(), console::render_line(&line))?;
                out.flush()?;
            }
            Ok(None) => thread::yield_now(),
            Err(SessionError::Closed) => break,
            Err(e) => {
                // The input side is blocked on the console; tell the user now.
                let mut out = out.lock();
                writeln!(out, "\n\t  Receive failed: {e}")?;
                writeln!(out, "\t  Press Enter to exit")?;
                out.flush()?;
                return Err(e.into());
            }
        }
    }
    Ok(received)
}

fn send_typed_lines<P: SerialPortAdapter, W: Write>(
    session: &Mutex<&mut HalfDuplexSession<P>>,
    out: &Mutex<&mut W>,
    input: &mut impl BufRead,
) -> ServiceResult<usize> {
    let mut sent = 0usize;
    loop {
        {
            let mut out = out.lock();
            write!(out, "send (quit to exit): ")?;
            out.flush()?;
        }

        let Some(line) = console::read_input(input)? else {
            break;
        };
        if line.trim().eq_ignore_ascii_case("quit") {
            break;
        }

        {
            let mut session = session.lock();
            session.set_direction(Direction::Transmit)?;
            let written = session.write_line(&line);
            // Return to listening even if the write failed on a live port.
            if session.is_open() {
                session.set_direction(Direction::Receive)?;
            }
            written?;
        }
        sent += 1;

        let mut out = out.lock();
        writeln!(out, "[sent] \"{line}\"")?;
        out.flush()?;
    }
    Ok(sent)
}
