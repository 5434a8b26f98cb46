//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection and engine/admin wiring
//! - `routes/`: HTTP handlers (one file per surface)
//! - `dto.rs`: wire shapes of the plugin protocol and the admin API
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower::ServiceBuilder;

use portgate_infra::GatewayConfig;

use crate::middleware::{self, AdminCredentials};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router from configuration (used by `main.rs`).
pub async fn build_app(config: &GatewayConfig) -> Result<Router> {
    let store = services::open_store(config).await?;
    let services = Arc::new(services::build_services(config, store).await?);
    Ok(build_router(services, admin_credentials(config)))
}

/// `None` leaves the admin routes open. Configured values are compared verbatim.
pub fn admin_credentials(config: &GatewayConfig) -> Option<AdminCredentials> {
    if config.admin_auth_enabled() {
        Some(AdminCredentials::new(
            config.admin_user.clone(),
            config.admin_password.clone(),
        ))
    } else {
        tracing::warn!("admin credentials not configured; admin API is unauthenticated");
        None
    }
}

pub fn build_router(services: Arc<services::AppServices>, admin: Option<AdminCredentials>) -> Router {
    let mut admin_routes = routes::admin_router();
    if let Some(credentials) = admin {
        admin_routes = admin_routes.route_layer(axum::middleware::from_fn_with_state(
            credentials,
            middleware::basic_auth_middleware,
        ));
    }

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/handler", post(routes::plugin::handle))
        .route("/portal/login", post(routes::portal::login))
        .merge(admin_routes)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
