use std::fs;
use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use portgate_core::{RecordClock, UpstreamServer};

/// Gateway configuration sourced from environment variables, optionally
/// overlaid by the YAML file named in `PORTGATE_CONFIG`.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub admin_user: String,
    pub admin_password: String,
    pub clock: RecordClock,
    pub servers: Vec<UpstreamServer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GatewayConfigOverride {
    bind_addr: Option<String>,
    database_url: Option<String>,
    admin_user: Option<String>,
    admin_password: Option<String>,
    utc_offset: Option<String>,
    #[serde(default)]
    servers: Vec<UpstreamServer>,
}

fn parse_offset(text: &str, source: &str) -> Result<RecordClock> {
    match RecordClock::from_offset_str(text) {
        Some(clock) => Ok(clock),
        None => bail!("parse {source}: invalid UTC offset {text:?}"),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind_addr = lookup("PORTGATE_BIND")
            .unwrap_or_else(|| "0.0.0.0:7200".to_string())
            .parse()
            .with_context(|| "parse PORTGATE_BIND")?;
        let clock = match non_empty(lookup("PORTGATE_UTC_OFFSET")) {
            Some(offset) => parse_offset(&offset, "PORTGATE_UTC_OFFSET")?,
            None => RecordClock::default(),
        };

        let mut config = Self {
            bind_addr,
            database_url: non_empty(lookup("PORTGATE_DATABASE_URL")),
            admin_user: lookup("PORTGATE_ADMIN_USER").unwrap_or_default(),
            admin_password: lookup("PORTGATE_ADMIN_PASSWORD").unwrap_or_default(),
            clock,
            servers: Vec::new(),
        };

        if let Some(path) = non_empty(lookup("PORTGATE_CONFIG")) {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read PORTGATE_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    /// Overlay values from a YAML document.
    pub fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let overlay: GatewayConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse gateway config yaml")?;

        if let Some(value) = overlay.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = overlay.database_url {
            self.database_url = non_empty(Some(value));
        }
        if let Some(value) = overlay.admin_user {
            self.admin_user = value;
        }
        if let Some(value) = overlay.admin_password {
            self.admin_password = value;
        }
        if let Some(value) = overlay.utc_offset {
            self.clock = parse_offset(&value, "utc_offset")?;
        }

        for server in overlay.servers {
            if server.name.trim().is_empty() {
                bail!("server entry without a name");
            }
            self.servers.retain(|existing| existing.name != server.name);
            self.servers.push(server);
        }
        Ok(())
    }

    /// Admin routes are only guarded when both credentials are set.
    pub fn admin_auth_enabled(&self) -> bool {
        !self.admin_user.trim().is_empty() && !self.admin_password.trim().is_empty()
    }
}
