use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use portgate_auth::PortalLogin;

use crate::app::dto::PortalLoginRequest;
use crate::app::errors;
use crate::app::services::AppServices;

/// `POST /portal/login`: self-service credential check, expiry included.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<PortalLoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "param_error",
                rejection.body_text(),
            );
        }
    };

    let now = services.clock.now();
    match services
        .engine
        .verify_portal_login(&request.user, &request.token, now)
        .await
    {
        PortalLogin::Granted(record) => {
            let record = *record;
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "login success",
                    "user": record.user,
                    "server": record.server.unwrap_or_default(),
                    "expire_date": record.expire_date,
                })),
            )
                .into_response()
        }
        PortalLogin::Denied(reason) => {
            errors::json_error(StatusCode::UNAUTHORIZED, "login_denied", reason)
        }
    }
}
