use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};

#[derive(Clone)]
pub struct AdminCredentials {
    inner: Arc<(String, String)>,
}

impl AdminCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            inner: Arc::new((user.into(), password.into())),
        }
    }

    fn matches(&self, user: &str, password: &str) -> bool {
        self.inner.0 == user && self.inner.1 == password
    }
}

/// HTTP basic auth for the admin routes.
pub async fn basic_auth_middleware(
    State(credentials): State<AdminCredentials>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match extract_basic(req.headers()) {
        Some((user, password)) if credentials.matches(&user, &password) => next.run(req).await,
        _ => {
            tracing::info!(path = %req.uri().path(), "admin request rejected: bad credentials");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    let mut res = StatusCode::UNAUTHORIZED.into_response();
    res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"portgate\""),
    );
    res
}

fn extract_basic(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
