// Session module - Facade tying transport, read loop and line history together
#[allow(clippy::module_inception)]
pub mod session;
pub mod sink;

pub use session::SerialSession;
pub use sink::{LineSink, NullSink};
