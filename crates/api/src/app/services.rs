use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use portgate_auth::PolicyDecisionEngine;
use portgate_core::RecordClock;
use portgate_infra::{
    AdminOperations, GatewayConfig, InMemoryRecordStore, PostgresRecordStore, RecordStore,
    StoreBackedSource, TokenRegistry,
};

/// Store shared by the decision path and the admin path.
pub type SharedStore = Arc<dyn RecordStore>;

/// Everything the HTTP handlers need, wired once at startup.
pub struct AppServices {
    pub engine: PolicyDecisionEngine<StoreBackedSource<SharedStore>>,
    pub admin: AdminOperations<SharedStore>,
    pub clock: RecordClock,
}

impl AppServices {
    pub fn store(&self) -> &SharedStore {
        self.admin.store()
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        self.admin.registry()
    }
}

/// Open the configured store (Postgres when a URL is set, memory otherwise).
pub async fn open_store(config: &GatewayConfig) -> Result<SharedStore> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresRecordStore::connect(url)
                .await
                .context("connect to PORTGATE_DATABASE_URL")?;
            store.ensure_schema().await.context("ensure database schema")?;
            info!("using postgres record store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("PORTGATE_DATABASE_URL not set; records are kept in memory only");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
    }
}

/// Wire services over `store`: publish configured servers, then load the registry.
pub async fn build_services(config: &GatewayConfig, store: SharedStore) -> Result<AppServices> {
    for server in &config.servers {
        store
            .upsert_server(server)
            .await
            .with_context(|| format!("register upstream server {}", server.name))?;
    }

    let admin = AdminOperations::new(store.clone(), Arc::new(TokenRegistry::new()), config.clock);
    let loaded = admin.bootstrap().await.context("load policy records")?;
    info!(records = loaded, servers = config.servers.len(), "services ready");

    Ok(AppServices {
        engine: PolicyDecisionEngine::new(StoreBackedSource::new(store)),
        admin,
        clock: config.clock,
    })
}
