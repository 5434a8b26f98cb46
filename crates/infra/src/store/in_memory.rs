use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;

use portgate_core::{PolicyRecord, UpstreamServer};

use super::{RecordStore, StoreError, StoreResult};

/// In-memory record store.
///
/// Intended for tests/dev. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, PolicyRecord>>,
    servers: RwLock<HashMap<String, UpstreamServer>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Unexpected(anyhow!("lock poisoned"))
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load_all(&self) -> StoreResult<Vec<PolicyRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().cloned().collect())
    }

    async fn find(&self, user: &str) -> StoreResult<Option<PolicyRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(user).cloned())
    }

    async fn create(&self, record: &PolicyRecord) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.contains_key(&record.user) {
            return Err(StoreError::Conflict(record.user.clone()));
        }
        records.insert(record.user.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &PolicyRecord) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        match records.get_mut(&record.user) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.user.clone())),
        }
    }

    async fn delete(&self, user: &str) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records
            .remove(user)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(user.to_string()))
    }

    async fn set_enabled(&self, user: &str, enabled: bool) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let existing = records
            .get_mut(user)
            .ok_or_else(|| StoreError::NotFound(user.to_string()))?;
        existing.enabled = enabled;
        Ok(())
    }

    async fn list_servers(&self) -> StoreResult<Vec<UpstreamServer>> {
        let servers = self.servers.read().map_err(|_| poisoned())?;
        let mut listed: Vec<UpstreamServer> = servers.values().cloned().collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listed)
    }

    async fn find_server(&self, name: &str) -> StoreResult<Option<UpstreamServer>> {
        let servers = self.servers.read().map_err(|_| poisoned())?;
        Ok(servers.get(name).cloned())
    }

    async fn upsert_server(&self, server: &UpstreamServer) -> StoreResult<()> {
        let mut servers = self.servers.write().map_err(|_| poisoned())?;
        servers.insert(server.name.clone(), server.clone());
        Ok(())
    }
}
