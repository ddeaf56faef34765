use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the link produced a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineTag {
    /// Data received from the device
    Received,
    /// Locally echoed command sent to the device
    Sent,
}

/// One line of terminal history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    pub sequence_id: u64,
    pub tag: LineTag,
    pub text: String,
}

/// Change to the line history, delivered to line sinks in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A new record was added; it may still be partial
    Appended(LineRecord),
    /// The partial record grew
    Extended(LineRecord),
    /// The record received its terminator and will not change again
    Sealed(LineRecord),
    /// The record was dropped to stay within capacity
    Evicted(LineRecord),
    /// History was cleared
    Cleared,
}

impl LineEvent {
    pub fn record(&self) -> Option<&LineRecord> {
        match self {
            LineEvent::Appended(record)
            | LineEvent::Extended(record)
            | LineEvent::Sealed(record)
            | LineEvent::Evicted(record) => Some(record),
            LineEvent::Cleared => None,
        }
    }
}

impl fmt::Display for LineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineTag::Received => write!(f, "RX"),
            LineTag::Sent => write!(f, "TX"),
        }
    }
}

impl fmt::Display for LineRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
