//! Transceiver direction and its control-line mapping.

use crate::port::LineLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way the RS-485 transceiver is pointed.
///
/// The USB adapter feeds RTS into ~RE and DTR into DE through inverters,
/// so asserting both lines enables the receiver and disables the driver,
/// and deasserting both does the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Receive,
    Transmit,
}

impl Direction {
    /// Level to drive on both RTS and DTR.
    pub fn line_level(self) -> LineLevel {
        match self {
            Direction::Receive => LineLevel::Asserted,
            Direction::Transmit => LineLevel::Deasserted,
        }
    }

    /// Human-readable summary of the resulting transceiver pin states.
    pub fn describe(self) -> &'static str {
        match self {
            Direction::Receive => "RTS = 1, DTR = 1 -> ~RE = 0, DE = 0 (receive mode)",
            Direction::Transmit => "RTS = 0, DTR = 0 -> ~RE = 1, DE = 1 (transmit mode)",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Receive => f.write_str("receive"),
            Direction::Transmit => f.write_str("transmit"),
        }
    }
}
