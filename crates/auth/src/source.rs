use async_trait::async_trait;
use thiserror::Error;

use portgate_core::{PolicyRecord, UpstreamServer};

/// A lookup against the backing store failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("policy lookup failed: {0}")]
pub struct LookupError(pub String);

/// Read-side contract the decision engine evaluates against.
///
/// Implementations should read committed durable state, so a decision always
/// reflects the latest successful admin write.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn policy_record(&self, user: &str) -> Result<Option<PolicyRecord>, LookupError>;

    async fn upstream_server(&self, name: &str) -> Result<Option<UpstreamServer>, LookupError>;
}

#[async_trait]
impl<S> PolicySource for std::sync::Arc<S>
where
    S: PolicySource + ?Sized,
{
    async fn policy_record(&self, user: &str) -> Result<Option<PolicyRecord>, LookupError> {
        (**self).policy_record(user).await
    }

    async fn upstream_server(&self, name: &str) -> Result<Option<UpstreamServer>, LookupError> {
        (**self).upstream_server(name).await
    }
}
