use async_trait::async_trait;

use portgate_auth::{LookupError, PolicySource};
use portgate_core::{PolicyRecord, UpstreamServer};

use crate::store::RecordStore;

/// Serves decision-path lookups straight from the durable store.
#[derive(Debug, Clone)]
pub struct StoreBackedSource<S> {
    store: S,
}

impl<S> StoreBackedSource<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: RecordStore> PolicySource for StoreBackedSource<S> {
    async fn policy_record(&self, user: &str) -> Result<Option<PolicyRecord>, LookupError> {
        self.store
            .find(user)
            .await
            .map_err(|e| LookupError(e.to_string()))
    }

    async fn upstream_server(&self, name: &str) -> Result<Option<UpstreamServer>, LookupError> {
        self.store
            .find_server(name)
            .await
            .map_err(|e| LookupError(e.to_string()))
    }
}
