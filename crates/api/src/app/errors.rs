use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use portgate_infra::OperationOutcome;

/// Plugin-protocol error body: `{"msg": ...}`.
pub fn plugin_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, axum::Json(json!({ "msg": message.into() }))).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Admin outcomes are always HTTP 200; success is carried in the body.
pub fn outcome_response(outcome: OperationOutcome) -> axum::response::Response {
    (StatusCode::OK, axum::Json(outcome)).into_response()
}

/// Body that could not be decoded into the admin request shape.
pub fn param_error(action: &str, err: impl std::fmt::Display) -> axum::response::Response {
    outcome_response(OperationOutcome::param_error(format!(
        "{action} failed, param error : {err}"
    )))
}
