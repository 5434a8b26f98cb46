use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use portgate_auth::NewProxyRequest;
use portgate_core::{PolicyRecord, RecordFilter, ServerSummary};

// -------------------------
// Plugin protocol
// -------------------------

/// Envelope sent by the upstream server for every lifecycle event.
#[derive(Debug, Deserialize)]
pub struct PluginRequest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct PluginQuery {
    pub version: Option<String>,
    pub op: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Client identity carried by every event.
#[derive(Debug, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub user: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metas: HashMap<String, String>,
    #[serde(default)]
    pub run_id: String,
}

impl UserInfo {
    pub fn token(&self) -> &str {
        self.metas.get("token").map(String::as_str).unwrap_or("")
    }
}

/// `Login` carries the user block at the top level.
pub type LoginContent = UserInfo;

#[derive(Debug, Deserialize)]
pub struct NewProxyContent {
    #[serde(default)]
    pub user: UserInfo,
    #[serde(default)]
    pub proxy_name: String,
    #[serde(default, alias = "proxyType")]
    pub proxy_type: String,
    #[serde(default, alias = "remotePort")]
    pub remote_port: u32,
    #[serde(default, alias = "customDomains", deserialize_with = "null_as_default")]
    pub custom_domains: Vec<String>,
    #[serde(default, alias = "subDomain")]
    pub subdomain: String,
}

impl From<NewProxyContent> for NewProxyRequest {
    fn from(content: NewProxyContent) -> Self {
        let token = content.user.token().to_string();
        Self {
            user: content.user.user,
            token,
            proxy_type: content.proxy_type,
            remote_port: content.remote_port,
            domains: content.custom_domains,
            subdomain: content.subdomain,
        }
    }
}

/// `Ping`, `NewWorkConn` and `NewUserConn` all carry just the user block.
#[derive(Debug, Deserialize)]
pub struct UserScopedContent {
    #[serde(default)]
    pub user: UserInfo,
}

// -------------------------
// Admin API
// -------------------------

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub before: PolicyRecord,
    pub after: PolicyRecord,
}

/// Target of a batch operation; only `user` is read.
#[derive(Debug, Deserialize)]
pub struct BatchTarget {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub users: Vec<BatchTarget>,
}

impl BatchRequest {
    pub fn user_names(&self) -> Vec<String> {
        self.users.iter().map(|t| t.user.clone()).collect()
    }
}

/// Listing parameters; a zero `limit` returns every match.
#[derive(Debug, Default, Deserialize)]
pub struct TokensQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub server: String,
}

impl TokensQuery {
    pub fn filter(&self) -> RecordFilter {
        RecordFilter {
            user: self.user.clone(),
            token: self.token.clone(),
            comment: self.comment.clone(),
            server: self.server.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokensPage {
    pub code: u8,
    pub msg: String,
    pub count: usize,
    pub data: Vec<PolicyRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MaxPortQuery {
    #[serde(default)]
    pub server: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardsResponse {
    pub success: bool,
    pub servers: Vec<ServerSummary>,
}

// -------------------------
// Portal
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PortalLoginRequest {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub token: String,
}
