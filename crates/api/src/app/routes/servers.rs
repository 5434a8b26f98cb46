use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;

use portgate_core::ServerSummary;
use portgate_infra::RecordStore;

use crate::app::dto::{self, DashboardsResponse};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/dashboards", get(list_dashboards))
        .route("/get_max_port", get(max_port))
        .route("/get_all_max_ports", get(all_max_ports))
}

/// Configured upstream servers, without their dashboard credentials.
pub async fn list_dashboards(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.store().list_servers().await {
        Ok(servers) => (
            StatusCode::OK,
            Json(DashboardsResponse {
                success: true,
                servers: servers.iter().map(ServerSummary::from).collect(),
            }),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "list upstream servers failed");
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
        }
    }
}

pub async fn max_port(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::MaxPortQuery>,
) -> axum::response::Response {
    let server = query.server.trim();
    if server.is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "param_error",
            "Server name is required",
        );
    }

    let max_port = services.registry().max_port_for_server(server);
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "maxPort": max_port,
            "message": "Get max port success",
        })),
    )
        .into_response()
}

pub async fn all_max_ports(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "maxPortsMap": services.registry().max_ports_by_server(),
            "message": "Get all max ports success",
        })),
    )
        .into_response()
}
