//! Resource scoping checks for new proxies.
//!
//! Each check returns `Ok(())` when the request is allowed and the rejection
//! reason otherwise.

use std::fmt;
use std::str::FromStr;

use portgate_core::{PolicyRecord, PortRule};

/// Proxy types governed by the engine. Anything else passes through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProxyType {
    Tcp,
    TcpMux,
    Udp,
    Http,
    Https,
}

impl ProxyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Tcp => "tcp",
            ProxyType::TcpMux => "tcpmux",
            ProxyType::Udp => "udp",
            ProxyType::Http => "http",
            ProxyType::Https => "https",
        }
    }

    pub fn checks_port(self) -> bool {
        matches!(self, ProxyType::Tcp | ProxyType::Udp)
    }

    pub fn checks_domains(self) -> bool {
        matches!(self, ProxyType::Http | ProxyType::Https | ProxyType::TcpMux)
    }

    pub fn checks_subdomain(self) -> bool {
        matches!(self, ProxyType::Http | ProxyType::Https)
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The text did not name a governed proxy type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UngovernedProxyType;

impl FromStr for ProxyType {
    type Err = UngovernedProxyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(ProxyType::Tcp),
            "tcpmux" => Ok(ProxyType::TcpMux),
            "udp" => Ok(ProxyType::Udp),
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            _ => Err(UngovernedProxyType),
        }
    }
}

/// Port check for tcp/udp proxies.
///
/// A missing record allows the port. This branch is unreachable after a
/// successful authentication and is kept as observed behavior.
pub fn check_port(user: &str, record: Option<&PolicyRecord>, port: u32) -> Result<(), String> {
    let Some(record) = record else {
        return Ok(());
    };

    match PortRule::scan(&record.ports, port) {
        Ok(true) => Ok(()),
        Ok(false) => Err(format!("user [{user}] port [{port}] is not allowed")),
        Err(format) => Err(format.describe(user)),
    }
}

/// Domain check for http/https/tcpmux proxies. Exact membership only.
pub fn check_domains(
    user: &str,
    record: Option<&PolicyRecord>,
    requested: &[String],
) -> Result<(), String> {
    let Some(record) = record else {
        return Ok(());
    };

    if unrestricted(&record.domains) {
        return Ok(());
    }

    if requested.iter().all(|domain| record.domains.contains(domain)) {
        Ok(())
    } else {
        Err(format!(
            "user [{user}] domain [{}] is not allowed",
            requested.join(",")
        ))
    }
}

/// Subdomain check for http/https proxies.
///
/// Like [`check_port`], a missing record allows.
pub fn check_subdomain(
    user: &str,
    record: Option<&PolicyRecord>,
    subdomain: &str,
) -> Result<(), String> {
    let Some(record) = record else {
        return Ok(());
    };

    if unrestricted(&record.subdomains) || record.subdomains.iter().any(|s| s == subdomain) {
        Ok(())
    } else {
        Err(format!("user [{user}] subdomain [{subdomain}] is not allowed"))
    }
}

fn unrestricted(entries: &[String]) -> bool {
    entries.is_empty() || entries.iter().any(String::is_empty)
}
