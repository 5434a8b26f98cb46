//! Process-wide logging setup and request correlation helpers.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info");
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::{new_request_id, request_id_or_new};
