//! LineTerm Library
//!
//! Line-oriented serial terminal core: a self-recovering transport, a
//! background read loop with coalesced notifications, and a bounded,
//! filterable line history.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::lines::{FilterSpec, LineBuffer, LineEvent, LineRecord, LineTag};
pub use crate::core::read_loop::{DataChunk, ReadLoop, ReadLoopSettings};
pub use crate::core::session::{LineSink, NullSink, SerialSession};
pub use crate::core::status::{ConnectionState, StatusPublisher, StatusSnapshot};
pub use crate::core::transport::{
    MemoryDevice, PortHandle, PortOpener, Transport, TransportError, TransportErrorKind,
    TransportSettings,
};
pub use domain::config::{TermConfig, TerminalOptions, TransportConfig};
pub use domain::error::{TermError, TermResult};
