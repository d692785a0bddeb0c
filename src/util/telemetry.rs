//! Telemetry helpers for structured logging and tracing.
//!
//! The queue logs through `tracing`. With no subscriber installed every event is
//! discarded, which is the silent default.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Install a `fmt` subscriber filtered at `level` if none is set yet.
///
/// Accepts `debug`, `info`, `warn`, `error` and `silent` (case-insensitive).
/// Anything else falls back to `info`.
pub fn init_tracing_with_level(level: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter_directive(level)))
        .try_init();
}

/// Map a user-facing log level name to an `EnvFilter` directive.
#[must_use]
pub fn filter_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        "silent" | "off" | "none" => "off",
        _ => "info",
    }
}
