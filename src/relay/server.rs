//! Relay endpoint: `GET /api/cors?url=<target>`.
//!
//! Fetches the target and returns its body with the target's
//! `Content-Type` and `Access-Control-Allow-Origin: *`, so a browser page
//! can read feeds from other origins.

use axum::{
    extract::{RawQuery, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::client::{read_limited_bytes, redirect_policy, DEFAULT_MAX_RESPONSE_BYTES};
use crate::util::{ensure_public_host, validate_url, UrlValidationError};

/// Route the relay handler is mounted on.
pub const RELAY_PATH: &str = "/api/cors";

const MISSING_URL: &str = "URL query parameter is required";
const INVALID_URL: &str = "URL query parameter must be an absolute http(s) URL";
const FORBIDDEN_TARGET: &str = "Target host is not allowed";
const FETCH_FAILED: &str = "Failed to fetch the requested URL";

/// Shared state for the relay handler.
///
/// Owns the upstream client, whose redirect policy follows
/// `allow_private_targets`.
#[derive(Debug, Clone)]
pub struct RelayState {
    client: reqwest::Client,
    allow_private_targets: bool,
    max_response_bytes: usize,
}

impl RelayState {
    /// Creates relay state from a base client configuration.
    ///
    /// # Arguments
    ///
    /// * `builder` - timeout, user agent and the like, usually
    ///   [`http_client_builder`](crate::relay::http_client_builder). Any redirect
    ///   policy on it is replaced.
    /// * `allow_private_targets` - permit loopback and private-network
    ///   targets, both as the requested URL and as a redirect hop
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error when the client cannot be built.
    pub fn new(
        builder: reqwest::ClientBuilder,
        allow_private_targets: bool,
    ) -> reqwest::Result<Self> {
        let client = builder
            .redirect(redirect_policy(allow_private_targets))
            .build()?;
        Ok(Self {
            client,
            allow_private_targets,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        })
    }

    /// Caps relayed bodies at `limit` bytes. Larger upstream bodies are
    /// answered with the 500 fetch-failure error instead.
    pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
        self.max_response_bytes = limit;
        self
    }
}

/// Creates the relay router.
///
/// Every response, errors included, carries `Access-Control-Allow-Origin: *`,
/// and `OPTIONS` preflights are answered by the CORS layer.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(RELAY_PATH, get(relay))
        .with_state(Arc::new(state))
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any)
}

/// Binds `addr` and serves the relay until the process is stopped.
pub async fn serve(addr: SocketAddr, state: RelayState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        path = RELAY_PATH,
        allow_private = state.allow_private_targets,
        "Relay listening"
    );
    axum::serve(listener, router(state)).await
}

async fn relay(State(state): State<Arc<RelayState>>, RawQuery(query): RawQuery) -> Response {
    let Some(raw_target) = query.as_deref().and_then(target_param) else {
        return json_error(StatusCode::BAD_REQUEST, MISSING_URL);
    };

    let target = match validate_url(&raw_target) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!(target = %raw_target, error = %e, "Rejected relay target");
            return json_error(StatusCode::BAD_REQUEST, INVALID_URL);
        }
    };

    if !state.allow_private_targets {
        if let Err(e) = ensure_public_host(&target) {
            tracing::warn!(target = %target, error = %e, "Rejected private relay target");
            return json_error(StatusCode::BAD_REQUEST, FORBIDDEN_TARGET);
        }
    }

    let upstream = match state.client.get(target.as_str()).send().await {
        Ok(response) => response,
        Err(e) if redirected_to_private_host(&e) => {
            tracing::warn!(target = %target, error = %e, "Relay target redirected to private host");
            return json_error(StatusCode::BAD_REQUEST, FORBIDDEN_TARGET);
        }
        Err(e) => {
            tracing::warn!(target = %target, error = %e, "Relay fetch failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, FETCH_FAILED);
        }
    };

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok());

    let body = match read_limited_bytes(upstream, state.max_response_bytes).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(target = %target, error = %e, "Relay body read failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, FETCH_FAILED);
        }
    };

    tracing::debug!(target = %target, status = status.as_u16(), bytes = body.len(), "Relayed");

    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    match content_type {
        Some(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        None => {
            headers.remove(header::CONTENT_TYPE);
        }
    }
    response
}

/// First non-blank `url` parameter of a raw query string.
fn target_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Whether the redirect policy refused a hop onto a private host.
fn redirected_to_private_host(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.downcast_ref::<UrlValidationError>().is_some() {
            return true;
        }
        source = inner.source();
    }
    false
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
