//! `portgate-core` — policy domain building blocks.
//!
//! This crate contains **pure domain** types (no storage, no transport):
//! policy records, port rules, upstream server definitions and the
//! field validator used on admission.

pub mod error;
pub mod ports;
pub mod record;
pub mod server;
pub mod time;
pub mod validate;

pub use error::{PolicyError, PolicyResult, ResultCode, ValidationField};
pub use ports::{PortFormatError, PortRule};
pub use record::{PolicyRecord, RecordFilter};
pub use server::{ServerSummary, UpstreamServer};
pub use time::RecordClock;
pub use validate::{OperationKind, RecordValidator};
