//! Tracing/logging initialization.
//!
//! Structured JSON logs, filtered via `RUST_LOG`. Engine operations emit
//! info-level lines with the container code and weights as fields, so one
//! pick confirmation is one grep-able log record.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("harvesthub=info,info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
