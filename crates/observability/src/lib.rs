//! Tracing and logging (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// The output format comes from `LOG_FORMAT` (`json` or `pretty`, default
/// `json`); the level filter from `RUST_LOG` (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use crate::tracing::{LogFormat, UnknownLogFormat};
