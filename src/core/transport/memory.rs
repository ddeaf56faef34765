//! In-memory device for tests and dry runs.
//!
//! A [`MemoryDevice`] plays the role of one physical port: it can be plugged,
//! unplugged, held busy by another owner, fed incoming bytes and inspected
//! for outgoing bytes. It implements [`PortOpener`] so it can stand in for
//! the system serial driver anywhere a transport is built.
//!
//! ```
//! use lineterm::core::transport::{MemoryDevice, PortHandle, PortOpener};
//! use lineterm::domain::config::TransportConfig;
//! use std::time::Duration;
//!
//! let device = MemoryDevice::new("LOOP0");
//! device.feed(b"hello\r\n");
//!
//! let mut port = device
//!     .open(&TransportConfig::new("LOOP0", 9600), Duration::from_millis(10))
//!     .unwrap();
//! let mut buffer = [0u8; 16];
//! assert_eq!(port.read_bytes(&mut buffer).unwrap(), 7);
//! ```

use super::error::TransportError;
use super::port::{PortHandle, PortOpener};
use crate::domain::config::TransportConfig;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct DeviceState {
    present: bool,
    busy: bool,
    generation: u64,
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    opens: usize,
    read_failures: VecDeque<io::ErrorKind>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<DeviceState>,
    ready: Condvar,
}

/// Simulated serial device. Clones share the same device.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    name: String,
    shared: Arc<Shared>,
}

impl MemoryDevice {
    /// A device that is plugged in and free.
    pub fn new(name: impl Into<String>) -> Self {
        let device = Self::absent(name);
        device.shared.state.lock().present = true;
        device
    }

    /// A device that does not exist until [`plug`](Self::plug) is called.
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plug(&self) {
        self.shared.state.lock().present = true;
    }

    /// Remove the device; open handles fail their next read.
    pub fn unplug(&self) {
        let mut state = self.shared.state.lock();
        state.present = false;
        state.generation += 1;
        self.shared.ready.notify_all();
    }

    /// Simulate another process holding the device.
    pub fn set_busy(&self, busy: bool) {
        self.shared.state.lock().busy = busy;
    }

    /// Queue bytes for the next reads.
    pub fn feed(&self, bytes: &[u8]) {
        let mut state = self.shared.state.lock();
        state.incoming.extend(bytes);
        self.shared.ready.notify_all();
    }

    /// Make the next read fail with `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        let mut state = self.shared.state.lock();
        state.read_failures.push_back(kind);
        self.shared.ready.notify_all();
    }

    /// Everything written to the device so far.
    pub fn written(&self) -> Vec<u8> {
        self.shared.state.lock().written.clone()
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.shared.state.lock().opens
    }
}

impl PortOpener for MemoryDevice {
    fn open(
        &self,
        config: &TransportConfig,
        timeout: Duration,
    ) -> Result<Box<dyn PortHandle>, TransportError> {
        let mut state = self.shared.state.lock();

        if config.port_id != self.name || !state.present {
            return Err(TransportError::NotFound(config.port_id.clone()));
        }
        if state.busy {
            return Err(TransportError::Busy(config.port_id.clone()));
        }

        state.opens += 1;
        Ok(Box::new(MemoryHandle {
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
            generation: state.generation,
            timeout,
        }))
    }
}

#[derive(Debug)]
struct MemoryHandle {
    name: String,
    shared: Arc<Shared>,
    generation: u64,
    timeout: Duration,
}

impl MemoryHandle {
    fn removed(&self) -> TransportError {
        TransportError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            format!("{} was removed", self.name),
        ))
    }
}

impl PortHandle for MemoryHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        let state = self.shared.state.lock();
        state.present && state.generation == self.generation
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.shared.state.lock();

        loop {
            if !state.present || state.generation != self.generation {
                return Err(self.removed());
            }
            if let Some(kind) = state.read_failures.pop_front() {
                let err = io::Error::new(kind, "injected read failure");
                return Err(TransportError::from_io_error(&self.name, err));
            }
            if !state.incoming.is_empty() {
                let n = buffer.len().min(state.incoming.len());
                for (slot, byte) in buffer.iter_mut().zip(state.incoming.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            if self.shared.ready.wait_until(&mut state, deadline).timed_out() {
                return Err(TransportError::Timeout);
            }
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        if !state.present || state.generation != self.generation {
            return Err(self.removed());
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }
}
