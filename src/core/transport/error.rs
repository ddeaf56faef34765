//! Transport error taxonomy.
//!
//! Every failure the device layer can produce is classified into one of the
//! kinds below. Callers branch on [`TransportErrorKind`] rather than on the
//! driver's own error values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Errors that can occur while opening, reading or writing the device.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The device path does not exist.
    #[error("{0} does not exist")]
    NotFound(String),

    /// The device exists but another owner holds it exclusively.
    #[error("{0} already in use")]
    Busy(String),

    /// The device object reported an unexpected internal error.
    #[error("{port} is in an invalid state: {reason}")]
    InvalidState { port: String, reason: String },

    /// No bytes arrived before the read deadline. Not a failure.
    #[error("no data before the read deadline")]
    Timeout,

    /// The handle failed mid-stream (cable pulled, device reset).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation needs an open transport.
    #[error("transport is not open")]
    NotOpen,

    /// The requested link parameters cannot be applied.
    #[error("unsupported configuration: {0}")]
    Config(String),
}

/// Classification used for status reporting and recovery decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportErrorKind {
    NotFound,
    Busy,
    InvalidState,
    Timeout,
    Io,
}

impl TransportError {
    pub fn invalid_state(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            port: port.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::NotFound(_) => TransportErrorKind::NotFound,
            TransportError::Busy(_) => TransportErrorKind::Busy,
            TransportError::InvalidState { .. } | TransportError::Config(_) => {
                TransportErrorKind::InvalidState
            }
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Io(_) | TransportError::NotOpen => TransportErrorKind::Io,
        }
    }

    /// Whether the handle must be torn down and replaced before the next read.
    pub fn requires_recycle(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::Busy(_))
    }

    /// Classify a driver error raised while opening `port`.
    pub fn classify_open_error(port: &str, err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => TransportError::NotFound(port.to_string()),
            serialport::ErrorKind::InvalidInput => TransportError::Config(err.description),
            serialport::ErrorKind::Io(kind) => classify_io_kind(port, kind, &err.description),
            serialport::ErrorKind::Unknown => {
                if mentions_busy(&err.description) {
                    TransportError::Busy(port.to_string())
                } else {
                    TransportError::invalid_state(port, err.description)
                }
            }
        }
    }

    /// Classify an I/O error raised while reading from or writing to `port`.
    pub fn from_io_error(port: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
            io::ErrorKind::PermissionDenied => TransportError::Busy(port.to_string()),
            _ => TransportError::Io(err),
        }
    }
}

fn classify_io_kind(port: &str, kind: io::ErrorKind, description: &str) -> TransportError {
    match kind {
        io::ErrorKind::NotFound => TransportError::NotFound(port.to_string()),
        io::ErrorKind::PermissionDenied => TransportError::Busy(port.to_string()),
        _ if mentions_busy(description) => TransportError::Busy(port.to_string()),
        _ => TransportError::Io(io::Error::new(kind, description.to_string())),
    }
}

// EBUSY and ERROR_ACCESS_DENIED surface with different kinds per platform.
fn mentions_busy(description: &str) -> bool {
    let lower = description.to_ascii_lowercase();
    lower.contains("busy") || lower.contains("in use") || lower.contains("access is denied")
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::NotFound => write!(f, "not found"),
            TransportErrorKind::Busy => write!(f, "busy"),
            TransportErrorKind::InvalidState => write!(f, "invalid state"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Io => write!(f, "i/o error"),
        }
    }
}
