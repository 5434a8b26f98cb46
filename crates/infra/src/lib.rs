//! Infrastructure layer: record storage, registry, admin operations, config.

pub mod admin;
pub mod config;
pub mod registry;
pub mod source;
pub mod store;


pub use admin::{AdminOperations, ItemOutcome, ItemStatus, OperationOutcome};
pub use config::GatewayConfig;
pub use registry::TokenRegistry;
pub use source::StoreBackedSource;
pub use store::{InMemoryRecordStore, PostgresRecordStore, RecordStore, StoreError, StoreResult};
