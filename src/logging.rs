//! Logging configuration for the query runner.
//!
//! Logs go to stderr so that stdout carries only the result payload.

use tracing_subscriber::EnvFilter;

/// Returns the filter from `RUST_LOG`, or `default` when it is unset or invalid.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initializes logging to stderr.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(std::io::stderr)
        .try_init();
}
