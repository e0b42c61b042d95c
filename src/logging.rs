//! Logging setup
//!
//! Logs go to stderr so that stdout carries only JSON (CLI envelopes, MCP responses).
//! The level comes from `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    if installed.is_ok() {
        tracing::debug!("logging initialized");
    }
}
