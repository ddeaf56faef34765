// Lines module - Line reassembly, bounded history and filtering
pub mod buffer;
pub mod filter;
pub mod record;

pub use buffer::LineBuffer;
pub use filter::FilterSpec;
pub use record::{LineEvent, LineRecord, LineTag};
