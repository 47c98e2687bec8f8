//! Structured logging setup
//!
//! The store only emits `tracing` events; installing a subscriber is left to
//! the embedding process. [`init_tracing`] is a convenience for binaries and
//! tests that want console output.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "DATASTORE_LOG";

/// Filter used when [`LOG_ENV`] is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Install a formatted console subscriber filtered by `DATASTORE_LOG`
/// (e.g. `DATASTORE_LOG=datastore_core=debug`).
///
/// Safe to call more than once: returns `false` when a global subscriber was
/// already installed and leaves that subscriber in place.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
