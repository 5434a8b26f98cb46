//! Lifecycle-event decisions.
//!
//! Every path ends in a [`Decision`]; lookup failures degrade to a rejection
//! rather than surfacing as errors.

use chrono::NaiveDateTime;
use tracing::{error, info, instrument};

use portgate_core::{PolicyRecord, RecordClock};

use crate::decision::Decision;
use crate::proxy::{self, ProxyType};
use crate::source::PolicySource;

/// Payload of a `NewProxy` lifecycle event.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NewProxyRequest {
    pub user: String,
    pub token: String,
    pub proxy_type: String,
    pub remote_port: u32,
    pub domains: Vec<String>,
    pub subdomain: String,
}

impl std::fmt::Debug for NewProxyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewProxyRequest")
            .field("user", &self.user)
            .field("proxy_type", &self.proxy_type)
            .field("remote_port", &self.remote_port)
            .field("domains", &self.domains)
            .field("subdomain", &self.subdomain)
            .finish_non_exhaustive()
    }
}

/// Result of a portal credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalLogin {
    Granted(Box<PolicyRecord>),
    Denied(String),
}

impl PortalLogin {
    pub fn is_granted(&self) -> bool {
        matches!(self, PortalLogin::Granted(_))
    }
}

/// Evaluates lifecycle events against a [`PolicySource`].
///
/// Stateless between calls: each decision reads the source afresh.
#[derive(Debug, Clone)]
pub struct PolicyDecisionEngine<S> {
    source: S,
}

impl<S: PolicySource> PolicyDecisionEngine<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Credential check shared by every lifecycle event.
    #[instrument(skip(self, token), fields(op = "authenticate"))]
    pub async fn authenticate(&self, user: &str, token: &str) -> Decision {
        match self.authenticated_record(user, token).await {
            Ok(_) => Decision::Unchanged,
            Err(reason) => rejected(reason),
        }
    }

    /// `Login`: authenticate, then enforce server affinity against the
    /// address the callback came from.
    #[instrument(skip(self, token), fields(op = "Login"))]
    pub async fn authenticate_login(&self, user: &str, token: &str, remote_addr: &str) -> Decision {
        let record = match self.authenticated_record(user, token).await {
            Ok(record) => record,
            Err(reason) => return rejected(reason),
        };

        let Some(server_name) = record.server.as_deref() else {
            return Decision::Unchanged;
        };

        let server = match self.source.upstream_server(server_name).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                return rejected(format!(
                    "user [{user}] is configured for server [{server_name}], but this server is not defined"
                ));
            }
            Err(err) => {
                error!(error = %err, server = server_name, "server lookup failed");
                return rejected(format!(
                    "user [{user}] is configured for server [{server_name}], but this server is not defined"
                ));
            }
        };

        if server.dashboard_addr != remote_addr {
            return rejected(format!(
                "user [{user}] is not allowed to login from this server [{remote_addr}]"
            ));
        }

        Decision::Unchanged
    }

    /// `NewProxy`: authenticate, then apply the port, domain and subdomain
    /// checks active for the proxy type, stopping at the first rejection.
    #[instrument(
        skip(self, request),
        fields(
            op = "NewProxy",
            user = %request.user,
            proxy_type = %request.proxy_type,
            remote_port = request.remote_port
        )
    )]
    pub async fn authorize_new_proxy(&self, request: &NewProxyRequest) -> Decision {
        let user = request.user.as_str();
        let record = match self.authenticated_record(user, &request.token).await {
            Ok(record) => record,
            Err(reason) => return rejected(reason),
        };

        let Ok(proxy_type) = request.proxy_type.parse::<ProxyType>() else {
            return Decision::Unchanged;
        };

        // The snapshot read during authentication governs every check below.
        let record = Some(&record);

        if proxy_type.checks_port() {
            if let Err(reason) = proxy::check_port(user, record, request.remote_port) {
                return rejected(reason);
            }
        }

        if proxy_type.checks_domains() {
            if let Err(reason) = proxy::check_domains(user, record, &request.domains) {
                return rejected(reason);
            }
        }

        if proxy_type.checks_subdomain() {
            if let Err(reason) = proxy::check_subdomain(user, record, &request.subdomain) {
                return rejected(reason);
            }
        }

        Decision::Unchanged
    }

    /// `Ping`.
    #[instrument(skip(self, token), fields(op = "Ping"))]
    pub async fn authorize_heartbeat(&self, user: &str, token: &str) -> Decision {
        self.authenticate(user, token).await
    }

    /// `NewWorkConn`.
    #[instrument(skip(self, token), fields(op = "NewWorkConn"))]
    pub async fn authorize_work_connection(&self, user: &str, token: &str) -> Decision {
        self.authenticate(user, token).await
    }

    /// `NewUserConn`.
    #[instrument(skip(self, token), fields(op = "NewUserConn"))]
    pub async fn authorize_user_connection(&self, user: &str, token: &str) -> Decision {
        self.authenticate(user, token).await
    }

    /// Portal sign-in for a proxy user. Unlike the lifecycle checks, this one
    /// also refuses records past their expiry at `now`.
    #[instrument(skip(self, token, now), fields(op = "portal_login"))]
    pub async fn verify_portal_login(&self, user: &str, token: &str, now: NaiveDateTime) -> PortalLogin {
        let user = user.trim();
        if user.is_empty() || token.is_empty() {
            return denied("user or token can not be empty".to_string());
        }

        let record = match self.source.policy_record(user).await {
            Ok(Some(record)) => record,
            Ok(None) => return denied(format!("user [{user}] not exist")),
            Err(err) => {
                error!(error = %err, "record lookup failed");
                return denied(format!("user [{user}] not exist"));
            }
        };

        if !record.enabled {
            return denied(format!("user [{user}] is disabled"));
        }
        if record.token != token {
            return denied(format!("invalid token for user [{user}]"));
        }
        if record.is_expired_at(now) {
            return denied(format!(
                "user [{user}] expired at [{}]",
                RecordClock::format(record.expires_at().unwrap_or(now))
            ));
        }

        PortalLogin::Granted(Box::new(record))
    }

    async fn authenticated_record(&self, user: &str, token: &str) -> Result<PolicyRecord, String> {
        if user.is_empty() || token.is_empty() {
            return Err("user or meta token can not be empty".to_string());
        }

        let record = match self.source.policy_record(user).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(format!("user [{user}] not exist")),
            Err(err) => {
                error!(error = %err, "record lookup failed");
                return Err(format!("user [{user}] not exist"));
            }
        };

        if !record.enabled {
            return Err(format!("user [{user}] is disabled"));
        }
        if record.token != token {
            return Err(format!("invalid meta token for user [{user}]"));
        }
        Ok(record)
    }
}

fn rejected(reason: String) -> Decision {
    info!(reason = %reason, "rejected");
    Decision::Reject(reason)
}

fn denied(reason: String) -> PortalLogin {
    info!(reason = %reason, "portal login denied");
    PortalLogin::Denied(reason)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use portgate_core::UpstreamServer;

    use super::*;
    use crate::source::LookupError;

    #[derive(Default)]
    struct StaticSource {
        records: HashMap<String, PolicyRecord>,
        servers: HashMap<String, UpstreamServer>,
        broken: bool,
    }

    impl StaticSource {
        fn with(mut self, record: PolicyRecord) -> Self {
            self.records.insert(record.user.clone(), record);
            self
        }

        fn with_server(mut self, name: &str, addr: &str) -> Self {
            self.servers.insert(
                name.to_string(),
                UpstreamServer {
                    name: name.to_string(),
                    dashboard_addr: addr.to_string(),
                    dashboard_port: 7500,
                    dashboard_user: String::new(),
                    dashboard_pwd: String::new(),
                    dashboard_tls: false,
                },
            );
            self
        }
    }

    #[async_trait]
    impl PolicySource for StaticSource {
        async fn policy_record(&self, user: &str) -> Result<Option<PolicyRecord>, LookupError> {
            if self.broken {
                return Err(LookupError("connection reset".into()));
            }
            Ok(self.records.get(user).cloned())
        }

        async fn upstream_server(&self, name: &str) -> Result<Option<UpstreamServer>, LookupError> {
            Ok(self.servers.get(name).cloned())
        }
    }

    fn record(user: &str, token: &str) -> PolicyRecord {
        PolicyRecord::new(user, token)
    }

    fn new_proxy(user: &str, token: &str, proxy_type: &str) -> NewProxyRequest {
        NewProxyRequest {
            user: user.into(),
            token: token.into(),
            proxy_type: proxy_type.into(),
            ..Default::default()
        }
    }

    fn engine(source: StaticSource) -> PolicyDecisionEngine<StaticSource> {
        PolicyDecisionEngine::new(source)
    }

    #[tokio::test]
    async fn authenticate_rejections_in_order() {
        let mut disabled = record("off", "right");
        disabled.enabled = false;
        let engine = engine(StaticSource::default().with(record("u", "right")).with(disabled));

        assert_eq!(
            engine.authenticate("", "x").await,
            Decision::reject("user or meta token can not be empty")
        );
        assert_eq!(
            engine.authenticate("u", "").await,
            Decision::reject("user or meta token can not be empty")
        );
        assert_eq!(
            engine.authenticate("ghost", "x").await,
            Decision::reject("user [ghost] not exist")
        );
        assert_eq!(
            engine.authenticate("off", "right").await,
            Decision::reject("user [off] is disabled")
        );
        assert_eq!(
            engine.authenticate("u", "wrong").await,
            Decision::reject("invalid meta token for user [u]")
        );
        assert_eq!(engine.authenticate("u", "right").await, Decision::Unchanged);
    }

    #[tokio::test]
    async fn lookup_failure_rejects_instead_of_erroring() {
        let engine = engine(StaticSource {
            broken: true,
            ..Default::default()
        });
        assert_eq!(
            engine.authorize_heartbeat("u", "t").await,
            Decision::reject("user [u] not exist")
        );
    }

    #[tokio::test]
    async fn connection_events_are_plain_authentication() {
        let engine = engine(StaticSource::default().with(record("u", "t")));
        assert!(engine.authorize_heartbeat("u", "t").await.is_unchanged());
        assert!(engine.authorize_work_connection("u", "t").await.is_unchanged());
        assert!(engine.authorize_user_connection("u", "t").await.is_unchanged());
        assert!(!engine.authorize_user_connection("u", "x").await.is_unchanged());
    }

    #[tokio::test]
    async fn login_enforces_server_affinity() {
        let mut bound = record("bound", "t");
        bound.server = Some("edge".into());
        let mut orphan = record("orphan", "t");
        orphan.server = Some("gone".into());

        let engine = engine(
            StaticSource::default()
                .with(record("free", "t"))
                .with(bound)
                .with(orphan)
                .with_server("edge", "10.0.0.5"),
        );

        assert!(engine.authenticate_login("free", "t", "1.2.3.4").await.is_unchanged());
        assert!(engine.authenticate_login("bound", "t", "10.0.0.5").await.is_unchanged());
        assert_eq!(
            engine.authenticate_login("bound", "t", "10.0.0.6").await,
            Decision::reject("user [bound] is not allowed to login from this server [10.0.0.6]")
        );
        assert_eq!(
            engine.authenticate_login("orphan", "t", "10.0.0.5").await,
            Decision::reject(
                "user [orphan] is configured for server [gone], but this server is not defined"
            )
        );
        assert_eq!(
            engine.authenticate_login("bound", "bad", "10.0.0.5").await,
            Decision::reject("invalid meta token for user [bound]")
        );
    }

    #[tokio::test]
    async fn port_range_is_enforced_for_tcp() {
        let mut r = record("u", "t");
        r.ports = serde_json::from_str(r#"["8000-9000"]"#).unwrap();
        let engine = engine(StaticSource::default().with(r));

        let mut request = new_proxy("u", "t", "tcp");
        request.remote_port = 8500;
        assert_eq!(engine.authorize_new_proxy(&request).await, Decision::Unchanged);

        request.remote_port = 9500;
        assert_eq!(
            engine.authorize_new_proxy(&request).await,
            Decision::reject("user [u] port [9500] is not allowed")
        );

        // Ports are not consulted for http.
        request.proxy_type = "http".into();
        assert_eq!(engine.authorize_new_proxy(&request).await, Decision::Unchanged);
    }

    #[tokio::test]
    async fn domains_are_exact_membership() {
        let mut r = record("u", "t");
        r.domains = vec!["a.example.com".into()];
        let engine = engine(StaticSource::default().with(r));

        let mut request = new_proxy("u", "t", "http");
        request.domains = vec!["a.example.com".into()];
        assert_eq!(engine.authorize_new_proxy(&request).await, Decision::Unchanged);

        request.domains = vec!["b.example.com".into()];
        assert_eq!(
            engine.authorize_new_proxy(&request).await,
            Decision::reject("user [u] domain [b.example.com] is not allowed")
        );

        request.proxy_type = "tcpmux".into();
        assert!(!engine.authorize_new_proxy(&request).await.is_unchanged());
    }

    #[tokio::test]
    async fn subdomain_checked_after_domains() {
        let mut r = record("u", "t");
        r.domains = vec!["".into()];
        r.subdomains = vec!["web".into()];
        let engine = engine(StaticSource::default().with(r));

        let mut request = new_proxy("u", "t", "https");
        request.domains = vec!["whatever.io".into()];
        request.subdomain = "web".into();
        assert_eq!(engine.authorize_new_proxy(&request).await, Decision::Unchanged);

        request.subdomain = "api".into();
        assert_eq!(
            engine.authorize_new_proxy(&request).await,
            Decision::reject("user [u] subdomain [api] is not allowed")
        );

        // tcpmux has no subdomain check.
        request.proxy_type = "tcpmux".into();
        assert_eq!(engine.authorize_new_proxy(&request).await, Decision::Unchanged);
    }

    #[tokio::test]
    async fn ungoverned_types_pass_after_authentication() {
        let mut r = record("u", "t");
        r.ports = vec![portgate_core::PortRule::Exact(1)];
        let engine = engine(StaticSource::default().with(r));

        let mut request = new_proxy("u", "t", "stcp");
        request.remote_port = 2;
        assert_eq!(engine.authorize_new_proxy(&request).await, Decision::Unchanged);

        request.token = "nope".into();
        assert!(!engine.authorize_new_proxy(&request).await.is_unchanged());
    }

    #[tokio::test]
    async fn portal_login_checks_expiry() {
        let mut r = record("u", "t");
        r.expire_date = "2030-06-01 12:00:00".into();
        let engine = engine(StaticSource::default().with(r));
        let at = |y| {
            NaiveDate::from_ymd_opt(y, 6, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap()
        };

        assert!(engine.verify_portal_login(" u ", "t", at(2030)).await.is_granted());
        assert_eq!(
            engine.verify_portal_login("u", "t", at(2031)).await,
            PortalLogin::Denied("user [u] expired at [2030-06-01 12:00:00]".into())
        );
        assert_eq!(
            engine.verify_portal_login("u", "x", at(2029)).await,
            PortalLogin::Denied("invalid token for user [u]".into())
        );

        // Lifecycle events ignore expiry.
        assert!(engine.authenticate("u", "t").await.is_unchanged());
    }

    #[test]
    fn request_debug_hides_token() {
        let rendered = format!("{:?}", new_proxy("u", "hunter2", "tcp"));
        assert!(!rendered.contains("hunter2"));
    }

    proptest! {
        #[test]
        fn unrestricted_ports_allow_any_remote_port(
            port in 0u32..=65535,
            udp in any::<bool>(),
        ) {
            let engine = engine(StaticSource::default().with(record("u", "t")));
            let mut request = new_proxy("u", "t", if udp { "udp" } else { "tcp" });
            request.remote_port = port;

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let decision = runtime.block_on(engine.authorize_new_proxy(&request));
            prop_assert_eq!(decision, Decision::Unchanged);
        }

        #[test]
        fn blank_domain_entry_accepts_any_request(
            domains in proptest::collection::vec("[a-z]{1,8}\\.[a-z]{2,4}", 0..5),
        ) {
            let mut r = record("u", "t");
            r.domains = vec!["only.example.com".into(), "".into()];
            let engine = engine(StaticSource::default().with(r));
            let mut request = new_proxy("u", "t", "http");
            request.domains = domains;

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let decision = runtime.block_on(engine.authorize_new_proxy(&request));
            prop_assert_eq!(decision, Decision::Unchanged);
        }
    }
}
