//! Durable record storage boundary.
//!
//! The registry is rebuilt from a [`RecordStore`] at startup and every admin
//! mutation writes through it before the registry is touched.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use portgate_core::{PolicyError, PolicyRecord, UpstreamServer};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for PolicyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(user) => PolicyError::NotFound(user),
            StoreError::Conflict(user) => PolicyError::Conflict(user),
            StoreError::Unexpected(err) => PolicyError::persistence(format!("{err:#}")),
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every stored record, in no particular order.
    async fn load_all(&self) -> StoreResult<Vec<PolicyRecord>>;

    async fn find(&self, user: &str) -> StoreResult<Option<PolicyRecord>>;

    /// Insert a new record. `Conflict` if the user already exists.
    async fn create(&self, record: &PolicyRecord) -> StoreResult<()>;

    /// Replace an existing record. `NotFound` if the user is absent.
    async fn update(&self, record: &PolicyRecord) -> StoreResult<()>;

    /// Delete a record. `NotFound` if the user is absent.
    async fn delete(&self, user: &str) -> StoreResult<()>;

    /// Flip the enabled flag. `NotFound` if the user is absent.
    async fn set_enabled(&self, user: &str, enabled: bool) -> StoreResult<()>;

    async fn list_servers(&self) -> StoreResult<Vec<UpstreamServer>>;

    async fn find_server(&self, name: &str) -> StoreResult<Option<UpstreamServer>>;

    async fn upsert_server(&self, server: &UpstreamServer) -> StoreResult<()>;
}

#[async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn load_all(&self) -> StoreResult<Vec<PolicyRecord>> {
        (**self).load_all().await
    }

    async fn find(&self, user: &str) -> StoreResult<Option<PolicyRecord>> {
        (**self).find(user).await
    }

    async fn create(&self, record: &PolicyRecord) -> StoreResult<()> {
        (**self).create(record).await
    }

    async fn update(&self, record: &PolicyRecord) -> StoreResult<()> {
        (**self).update(record).await
    }

    async fn delete(&self, user: &str) -> StoreResult<()> {
        (**self).delete(user).await
    }

    async fn set_enabled(&self, user: &str, enabled: bool) -> StoreResult<()> {
        (**self).set_enabled(user, enabled).await
    }

    async fn list_servers(&self) -> StoreResult<Vec<UpstreamServer>> {
        (**self).list_servers().await
    }

    async fn find_server(&self, name: &str) -> StoreResult<Option<UpstreamServer>> {
        (**self).find_server(name).await
    }

    async fn upsert_server(&self, server: &UpstreamServer) -> StoreResult<()> {
        (**self).upsert_server(server).await
    }
}
