// Core module - Transport, read loop, line history and session facade
pub mod display;
pub mod lines;
pub mod read_loop;
pub mod session;
pub mod status;
pub mod transport;
