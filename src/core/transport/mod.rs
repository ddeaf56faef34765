// Transport module - Device lifecycle, error taxonomy and handle abstraction
pub mod error;
pub mod memory;
pub mod port;
#[allow(clippy::module_inception)]
pub mod transport;

pub use error::{TransportError, TransportErrorKind};
pub use memory::MemoryDevice;
pub use port::{PortHandle, PortOpener, RawChunk};
pub use transport::{Transport, TransportSettings};
