use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;

use portgate_auth::{Decision, NewProxyRequest, PluginResponse};
use portgate_observability::request_id_or_new;

use crate::app::dto::{self, LoginContent, NewProxyContent, PluginRequest, UserScopedContent};
use crate::app::errors;
use crate::app::services::AppServices;

const REQUEST_ID_HEADER: &str = "x-frp-reqid";

/// `POST /handler`: one lifecycle event from the upstream server.
pub async fn handle(
    Extension(services): Extension<Arc<AppServices>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<dto::PluginQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let request_id = request_id_or_new(header_str(&headers, REQUEST_ID_HEADER));

    let request: PluginRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(%request_id, error = %err, "undecodable plugin request");
            return errors::plugin_error(StatusCode::BAD_REQUEST, format!("invalid request body: {err}"));
        }
    };

    let op = if request.op.is_empty() {
        query.op.unwrap_or_default()
    } else {
        request.op
    };

    let decision = match op.as_str() {
        "Login" => match content::<LoginContent>(request.content) {
            Ok(login) => {
                let remote = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
                services
                    .engine
                    .authenticate_login(&login.user, login.token(), &remote)
                    .await
            }
            Err(res) => return res,
        },
        "NewProxy" => match content::<NewProxyContent>(request.content) {
            Ok(proxy) => {
                services
                    .engine
                    .authorize_new_proxy(&NewProxyRequest::from(proxy))
                    .await
            }
            Err(res) => return res,
        },
        "Ping" | "NewWorkConn" | "NewUserConn" => {
            match content::<UserScopedContent>(request.content) {
                Ok(scoped) => scoped_decision(&services, &op, &scoped).await,
                Err(res) => return res,
            }
        }
        other => {
            tracing::warn!(%request_id, op = other, "unknown plugin op");
            return errors::plugin_error(StatusCode::BAD_REQUEST, format!("unknown op [{other}]"));
        }
    };

    tracing::info!(
        %request_id,
        op = %op,
        reject = !decision.is_unchanged(),
        reason = decision.reason().unwrap_or(""),
        "plugin decision"
    );

    (StatusCode::OK, Json(PluginResponse::from(decision))).into_response()
}

async fn scoped_decision(services: &AppServices, op: &str, scoped: &UserScopedContent) -> Decision {
    let user = &scoped.user.user;
    let token = scoped.user.token();
    match op {
        "Ping" => services.engine.authorize_heartbeat(user, token).await,
        "NewWorkConn" => services.engine.authorize_work_connection(user, token).await,
        _ => services.engine.authorize_user_connection(user, token).await,
    }
}

fn content<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, axum::response::Response> {
    serde_json::from_value(value).map_err(|err| {
        errors::plugin_error(StatusCode::BAD_REQUEST, format!("invalid content: {err}"))
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Caller address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = header_str(headers, "x-real-ip")
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded.or(real_ip) {
        Some(ip) => ip.to_string(),
        None => peer.map(|addr| addr.ip().to_string()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_forwarded_headers() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.9");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 10.0.0.3"));
        assert_eq!(client_ip(&headers, Some(peer)), "10.0.0.1");
    }

    #[test]
    fn client_ip_without_any_source_is_blank() {
        assert_eq!(client_ip(&HeaderMap::new(), None), "");
    }
}
