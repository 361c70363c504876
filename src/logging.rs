//! `tracing` subscriber setup for binaries and tests.

use tracing_subscriber::EnvFilter;

/// Filter directives are read from this variable, e.g. `codex_bridge=debug`.
pub const LOG_FILTER_ENV: &str = "CODEX_BRIDGE_LOG";
const DEFAULT_FILTER: &str = "info";

/// Installs a stderr formatter. Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
