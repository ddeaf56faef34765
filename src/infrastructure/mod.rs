// Infrastructure module - External dependencies and adapters
pub mod config;
pub mod log_sink;
pub mod logging;
pub mod serial;
