// Logging module - Diagnostic output on stderr
use crate::domain::error::{TermError, TermResult};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive used when `RUST_LOG` is not set.
pub fn default_directive(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    format!("lineterm={},warn", level)
}

/// Initialize logging system
///
/// Stdout carries terminal lines, so diagnostics go to stderr.
pub fn init_logging(level: &str, verbose: bool) -> TermResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(level, verbose)))
        .map_err(|e| TermError::config(format!("Invalid log level {:?}: {}", level, e)))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(verbose)
                .with_level(true)
                .with_thread_names(verbose)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init()
        .map_err(|e| TermError::config(format!("Logging already initialized: {}", e)))?;

    tracing::debug!("Logging initialized");
    Ok(())
}
