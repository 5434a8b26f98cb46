//! Tracing/logging initialization.
//!
//! JSON lines to stdout, filtered by `RUST_LOG`. Decision callbacks are
//! correlated by the upstream request id.

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Initialize tracing/logging for the process with `default_directive` used
/// when `RUST_LOG` is unset or invalid.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_current_span(true)
        .with_target(false)
        .try_init();
}

/// Fresh time-ordered request id.
pub fn new_request_id() -> String {
    Uuid::now_v7().to_string()
}

/// Use the caller-supplied id when present, otherwise mint one.
pub fn request_id_or_new(supplied: Option<&str>) -> String {
    match supplied.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => new_request_id(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_supplied_request_id() {
        assert_eq!(request_id_or_new(Some(" abc-123 ")), "abc-123");
    }

    #[test]
    fn mints_v7_ids_when_missing() {
        let minted = request_id_or_new(Some("  "));
        let parsed = Uuid::parse_str(&minted).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
        assert_ne!(request_id_or_new(None), minted);
    }

    #[test]
    fn init_is_idempotent() {
        init("warn");
        init("debug");
    }
}
