//! Device abstraction.
//!
//! `PortOpener` produces fresh `PortHandle`s so the transport can replace a
//! dead handle after an unplug. The system implementation lives in
//! `infrastructure::serial`; tests supply in-memory ones.

use super::error::TransportError;
use crate::domain::config::TransportConfig;
use std::fmt;
use std::time::{Duration, Instant};

/// An open connection to one device.
pub trait PortHandle: Send + fmt::Debug {
    /// Device name this handle was opened on.
    fn name(&self) -> &str;

    /// Whether the device reports itself open.
    fn is_open(&self) -> bool {
        true
    }

    /// Read whatever is available into `buffer`, blocking at most for the
    /// handle's timeout. Returns `TransportError::Timeout` when nothing arrived.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError>;

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;
}

/// Factory for device handles.
pub trait PortOpener: Send + Sync {
    fn open(
        &self,
        config: &TransportConfig,
        timeout: Duration,
    ) -> Result<Box<dyn PortHandle>, TransportError>;
}

/// Bytes from one successful read, stamped on arrival.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub bytes: Vec<u8>,
    pub received_at: Instant,
}

impl RawChunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            received_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
