//! Diagnostic logging for novactl
//!
//! Tracing goes to stderr so it never interleaves with outcome lines on
//! stdout. The filter comes from LOG_LEVEL and defaults to `warn`.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "warn";

/// Build the filter from a LOG_LEVEL value (`debug`, `nova_common=trace`, ...)
pub fn filter_from(level: Option<&str>) -> EnvFilter {
    let directive = level
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_FILTER);

    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber; later calls are no-ops
pub fn init(level: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
