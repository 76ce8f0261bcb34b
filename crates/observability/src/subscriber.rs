//! Tracing/logging initialization.
//!
//! JSON lines with timestamps. `RUST_LOG` wins over any filter passed in code.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor the caller provides one.
pub const DEFAULT_FILTER: &str = "info";

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Like [`init`], with `fallback` used when `RUST_LOG` is unset or invalid.
///
/// An unparsable `fallback` falls back to [`DEFAULT_FILTER`]. Returns whether
/// this call installed the global subscriber.
pub fn init_with_filter(fallback: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok()
}
