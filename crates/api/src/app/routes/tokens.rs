use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::dto::{self, BatchRequest, TokensPage, UpdateRequest};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/tokens", get(list_tokens))
        .route("/add", post(add_token))
        .route("/update", post(update_token))
        .route("/remove", post(remove_tokens))
        .route("/enable", post(enable_tokens))
        .route("/disable", post(disable_tokens))
}

pub async fn list_tokens(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::TokensQuery>,
) -> axum::response::Response {
    let (data, count) = services
        .admin
        .query(&query.filter(), query.page, query.limit);

    (
        StatusCode::OK,
        Json(TokensPage {
            code: 0,
            msg: "query Tokens success".to_string(),
            count,
            data,
        }),
    )
        .into_response()
}

pub async fn add_token(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<portgate_core::PolicyRecord>, JsonRejection>,
) -> axum::response::Response {
    match body {
        Ok(Json(record)) => errors::outcome_response(services.admin.add(record).await),
        Err(rejection) => errors::param_error("user add", rejection.body_text()),
    }
}

pub async fn update_token(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> axum::response::Response {
    match body {
        Ok(Json(UpdateRequest { before, after })) => {
            errors::outcome_response(services.admin.update(before, after).await)
        }
        Err(rejection) => errors::param_error("user update", rejection.body_text()),
    }
}

pub async fn remove_tokens(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> axum::response::Response {
    match body {
        Ok(Json(batch)) => errors::outcome_response(services.admin.remove(&batch.user_names()).await),
        Err(rejection) => errors::param_error("user remove", rejection.body_text()),
    }
}

pub async fn enable_tokens(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> axum::response::Response {
    match body {
        Ok(Json(batch)) => errors::outcome_response(services.admin.enable(&batch.user_names()).await),
        Err(rejection) => errors::param_error("user enable", rejection.body_text()),
    }
}

pub async fn disable_tokens(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> axum::response::Response {
    match body {
        Ok(Json(batch)) => errors::outcome_response(services.admin.disable(&batch.user_names()).await),
        Err(rejection) => errors::param_error("user disable", rejection.body_text()),
    }
}
