use axum::Router;

pub mod plugin;
pub mod portal;
pub mod servers;
pub mod system;
pub mod tokens;

/// Router for the basic-auth guarded admin endpoints.
pub fn admin_router() -> Router {
    Router::new()
        .merge(tokens::router())
        .merge(servers::router())
}
