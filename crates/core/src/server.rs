//! Upstream reverse-proxy server definitions (login affinity targets).

use serde::{Deserialize, Serialize};

/// A named upstream server instance.
///
/// `dashboard_addr` doubles as the address the server's plugin callbacks
/// originate from; login affinity compares against it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamServer {
    pub name: String,
    pub dashboard_addr: String,
    #[serde(default)]
    pub dashboard_port: u16,
    #[serde(default)]
    pub dashboard_user: String,
    #[serde(default)]
    pub dashboard_pwd: String,
    #[serde(default)]
    pub dashboard_tls: bool,
}

/// Credential-free view of a server, safe to list to any admin client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSummary {
    pub name: String,
    pub dashboard_addr: String,
    pub dashboard_port: u16,
    pub dashboard_tls: bool,
}

impl From<&UpstreamServer> for ServerSummary {
    fn from(server: &UpstreamServer) -> Self {
        Self {
            name: server.name.clone(),
            dashboard_addr: server.dashboard_addr.clone(),
            dashboard_port: server.dashboard_port,
            dashboard_tls: server.dashboard_tls,
        }
    }
}
