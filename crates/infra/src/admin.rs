//! Administrative record operations.
//!
//! Every mutation follows validate → persist → cache. The registry is only
//! touched after the store accepted the write, and mutations are serialised
//! through a single write gate.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use portgate_core::{
    OperationKind, PolicyError, PolicyRecord, PolicyResult, RecordClock, RecordFilter,
    RecordValidator, ResultCode,
};

use crate::registry::TokenRegistry;
use crate::store::{RecordStore, StoreError, StoreResult};

/// Structured result of an admin operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub code: ResultCode,
    pub message: String,
    /// Per-user results of a batch operation, in request order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemOutcome>,
}

impl OperationOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: ResultCode::Success,
            message: message.into(),
            items: Vec::new(),
        }
    }

    pub fn failed(err: &PolicyError) -> Self {
        Self {
            success: false,
            code: err.code(),
            message: err.to_string(),
            items: Vec::new(),
        }
    }

    /// Undecodable request body.
    pub fn param_error(message: impl Into<String>) -> Self {
        Self::failed(&PolicyError::invalid_request(message))
    }

    fn with_items(mut self, items: Vec<ItemOutcome>) -> Self {
        self.items = items;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Written to the store and the registry.
    Applied,
    /// The store write failed; the batch stopped here.
    Failed,
    /// Not attempted because an earlier item failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub user: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ItemOutcome {
    fn new(user: &str, status: ItemStatus, message: Option<String>) -> Self {
        Self {
            user: user.to_string(),
            status,
            message,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BatchAction {
    Remove,
    Enable,
    Disable,
}

impl BatchAction {
    fn kind(self) -> OperationKind {
        match self {
            BatchAction::Remove => OperationKind::Remove,
            BatchAction::Enable => OperationKind::Enable,
            BatchAction::Disable => OperationKind::Disable,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            BatchAction::Remove => "remove",
            BatchAction::Enable => "enable",
            BatchAction::Disable => "disable",
        }
    }
}

/// Store write failures become `SaveError`; `NotFound`/`Conflict` keep their codes.
fn persist_failure(context: String, err: StoreError) -> PolicyError {
    match err {
        StoreError::Unexpected(err) => PolicyError::persistence(format!("{context}, db error : {err:#}")),
        other => other.into(),
    }
}

/// Admin entry points over a store and the registry.
pub struct AdminOperations<S> {
    store: S,
    registry: Arc<TokenRegistry>,
    clock: RecordClock,
    write_gate: Mutex<()>,
}

impl<S: RecordStore> AdminOperations<S> {
    pub fn new(store: S, registry: Arc<TokenRegistry>, clock: RecordClock) -> Self {
        Self {
            store,
            registry,
            clock,
            write_gate: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuild the registry from the store. Returns the number of records.
    #[instrument(skip(self), err)]
    pub async fn bootstrap(&self) -> StoreResult<usize> {
        let _gate = self.write_gate.lock().await;
        let records = self.store.load_all().await?;
        let count = records.len();
        self.registry.load(records);
        info!(count, "registry loaded from store");
        Ok(count)
    }

    #[instrument(skip(self, record), fields(user = %record.user))]
    pub async fn add(&self, record: PolicyRecord) -> OperationOutcome {
        conclude("add", self.try_add(record).await.map(|_| "user add success"))
    }

    async fn try_add(&self, mut record: PolicyRecord) -> PolicyResult<()> {
        let _gate = self.write_gate.lock().await;

        let exists = self.registry.contains(&record.user);
        RecordValidator::validate(&record, OperationKind::Add, exists)?;

        record.normalize();
        record.create_date = self.clock.stamp();

        self.store
            .create(&record)
            .await
            .map_err(|e| persist_failure("user add failed".to_string(), e))?;
        self.registry.put(record);
        Ok(())
    }

    #[instrument(skip(self, before, after), fields(user = %after.user))]
    pub async fn update(&self, before: PolicyRecord, after: PolicyRecord) -> OperationOutcome {
        conclude(
            "update",
            self.try_update(before, after).await.map(|_| "user update success"),
        )
    }

    async fn try_update(&self, before: PolicyRecord, mut after: PolicyRecord) -> PolicyResult<()> {
        if before.user != after.user {
            return Err(PolicyError::invalid_request(format!(
                "update failed, user should be same : before -> {}, after -> {}",
                before.user, after.user
            )));
        }

        let _gate = self.write_gate.lock().await;

        let exists = self.registry.contains(&after.user);
        RecordValidator::validate(&after, OperationKind::Update, exists)?;

        after.normalize();
        after.create_date = before.create_date.trim().to_string();

        self.store
            .update(&after)
            .await
            .map_err(|e| persist_failure("user update failed".to_string(), e))?;
        self.registry.put(after);
        Ok(())
    }

    pub async fn remove(&self, users: &[String]) -> OperationOutcome {
        self.batch(BatchAction::Remove, users).await
    }

    pub async fn enable(&self, users: &[String]) -> OperationOutcome {
        self.batch(BatchAction::Enable, users).await
    }

    pub async fn disable(&self, users: &[String]) -> OperationOutcome {
        self.batch(BatchAction::Disable, users).await
    }

    /// Validate every target, then persist one at a time. A store failure
    /// stops the batch; users written before it stay written.
    #[instrument(skip(self, users), fields(action = action.verb(), count = users.len()))]
    async fn batch(&self, action: BatchAction, users: &[String]) -> OperationOutcome {
        let _gate = self.write_gate.lock().await;

        let mut targets: Vec<&str> = Vec::with_capacity(users.len());
        for user in users {
            let user = user.trim();
            if targets.contains(&user) {
                continue;
            }
            let probe = PolicyRecord::new(user, "");
            if let Err(err) =
                RecordValidator::validate(&probe, action.kind(), self.registry.contains(user))
            {
                return conclude(action.verb(), Err(err));
            }
            targets.push(user);
        }

        let mut items = Vec::with_capacity(targets.len());
        let mut failure: Option<PolicyError> = None;

        for user in targets {
            if failure.is_some() {
                items.push(ItemOutcome::new(user, ItemStatus::Skipped, None));
                continue;
            }

            let written = match action {
                BatchAction::Remove => self.store.delete(user).await,
                BatchAction::Enable => self.store.set_enabled(user, true).await,
                BatchAction::Disable => self.store.set_enabled(user, false).await,
            };

            match written {
                Ok(()) => {
                    match action {
                        BatchAction::Remove => {
                            self.registry.delete(user);
                        }
                        BatchAction::Enable => {
                            self.registry.set_enabled(user, true);
                        }
                        BatchAction::Disable => {
                            self.registry.set_enabled(user, false);
                        }
                    }
                    items.push(ItemOutcome::new(user, ItemStatus::Applied, None));
                }
                Err(err) => {
                    let err = persist_failure(format!("user {} failed for {user}", action.verb()), err);
                    items.push(ItemOutcome::new(user, ItemStatus::Failed, Some(err.to_string())));
                    failure = Some(err);
                }
            }
        }

        let result = match failure {
            Some(err) => Err(err),
            None => Ok(match action {
                BatchAction::Remove => "user remove success",
                BatchAction::Enable => "user enable success",
                BatchAction::Disable => "user disable success",
            }),
        };
        conclude(action.verb(), result).with_items(items)
    }

    /// Filtered, sorted, paginated listing from the registry.
    pub fn query(&self, filter: &RecordFilter, page: usize, limit: usize) -> (Vec<PolicyRecord>, usize) {
        self.registry.query(filter, page, limit)
    }
}

fn conclude(operation: &str, result: PolicyResult<&str>) -> OperationOutcome {
    match result {
        Ok(message) => {
            info!(operation, "admin operation succeeded");
            OperationOutcome::succeeded(message)
        }
        Err(err) => {
            warn!(operation, code = err.code().as_u8(), error = %err, "admin operation failed");
            OperationOutcome::failed(&err)
        }
    }
}
