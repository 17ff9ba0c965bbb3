//! Console presentation for the command-line tools.
//!
//! Everything here writes to a caller-supplied `Write` and reads from a
//! caller-supplied `BufRead`, so the binary passes stdin/stdout and tests
//! pass byte buffers.

use crate::config::SerialConfig;
use crate::port::Framing;
use crate::session::Direction;
use std::io::{self, BufRead, Write};
use thiserror::Error;

const RULE: &str = "+---------------------------------------------------+";

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Console I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid baud rate '{0}': expected a positive integer")]
    InvalidBaud(String),

    #[error("Input closed before a value was entered")]
    Eof,
}

/// Boxed title banner shown when a tool starts.
pub fn banner(out: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "\t{RULE}")?;
    writeln!(out, "\t|{:^51}|", title)?;
    writeln!(out, "\t{RULE}")?;
    Ok(())
}

/// Echo the line settings that are about to be used.
pub fn print_settings(out: &mut impl Write, port: &str, baud: u32) -> io::Result<()> {
    let framing = Framing::EIGHT_N_ONE;
    writeln!(out)?;
    writeln!(out, "\t  {port} selected")?;
    writeln!(out, "\t  Baud rate = {baud}")?;
    writeln!(out, "\t  Framing   = {framing} (8 data bits, no parity, 1 stop bit)")?;
    Ok(())
}

pub fn print_direction(out: &mut impl Write, direction: Direction) -> io::Result<()> {
    writeln!(out, "\t  {}", direction.describe())
}

/// Read one line; `Ok(None)` at end of input.
pub fn read_input(input: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Trim whitespace and upper-case Windows `COMn` names. Device paths keep
/// their case.
pub fn normalize_port_name(raw: &str) -> String {
    let name = raw.trim();
    let is_com = name.len() > 3 && name.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("com"));
    if is_com {
        name.to_ascii_uppercase()
    } else {
        name.to_string()
    }
}

/// Turn what the user gave into a device name: a configured alias maps to
/// its device, anything else is normalized.
pub fn resolve_port_name(serial: &SerialConfig, raw: &str) -> String {
    let name = raw.trim();
    match serial.alias(name) {
        Some(device) => device.to_string(),
        None => normalize_port_name(name),
    }
}

pub fn parse_baud(raw: &str) -> Result<u32, ConsoleError> {
    match raw.trim().parse::<u32>() {
        Ok(baud) if baud > 0 => Ok(baud),
        _ => Err(ConsoleError::InvalidBaud(raw.trim().to_string())),
    }
}

/// Ask for a port name or alias; returned trimmed, not yet resolved.
pub fn prompt_port(input: &mut impl BufRead, out: &mut impl Write) -> Result<String, ConsoleError> {
    write!(out, "\t  Enter port name (eg :- COM32 or /dev/ttyUSB0) -> ")?;
    out.flush()?;
    let line = read_input(input)?.ok_or(ConsoleError::Eof)?;
    Ok(line.trim().to_string())
}

pub fn prompt_baud(input: &mut impl BufRead, out: &mut impl Write) -> Result<u32, ConsoleError> {
    write!(out, "\t  Enter baud rate (eg :- 9600) -> ")?;
    out.flush()?;
    let line = read_input(input)?.ok_or(ConsoleError::Eof)?;
    parse_baud(&line)
}

/// Block until Enter (or end of input).
pub fn wait_for_enter(
    input: &mut impl BufRead,
    out: &mut impl Write,
    message: &str,
) -> io::Result<()> {
    writeln!(out, "\n\t{RULE}")?;
    writeln!(out, "\t|{:^51}|", message)?;
    writeln!(out, "\t{RULE}")?;
    out.flush()?;
    read_input(input).map(|_| ())
}

/// Render control and non-ASCII bytes as escapes: `\r`, `\n`, `\t`, `\xNN`.
pub fn escape_ascii(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'\r' => text.push_str("\\r"),
            b'\n' => text.push_str("\\n"),
            b'\t' => text.push_str("\\t"),
            0x20..=0x7e => text.push(byte as char),
            _ => text.push_str(&format!("\\x{byte:02x}")),
        }
    }
    text
}

/// Detailed multi-line view of a received line.
pub fn render_line(bytes: &[u8]) -> String {
    let mut view = String::new();
    view.push_str("--- received ---\n");
    view.push_str(&format!("length: {} bytes\n", bytes.len()));
    view.push_str(&format!("ASCII:  \"{}\"\n", escape_ascii(bytes)));
    match std::str::from_utf8(bytes) {
        Ok(text) => view.push_str(&format!("UTF-8:  \"{text}\"\n")),
        Err(_) => view.push_str("UTF-8:  (not valid UTF-8)\n"),
    }
    view.push_str("----------------");
    view
}

/// Local wall-clock prefix for received lines.
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}
