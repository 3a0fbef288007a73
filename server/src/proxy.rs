//! Reverse proxy from the API prefix to the backend.
//!
//! The full request path, query string included, is appended to the backend
//! base URL, so `/milkman/customer/getAll?page=1` reaches
//! `<backend>/milkman/customer/getAll?page=1`. The `Host` header is rewritten
//! to the backend's own.

use crate::error::{Result, ServerError};
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::Response;
use std::time::Instant;

/// Largest request body forwarded to the backend.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forward the request to the backend and stream its response back.
pub async fn forward(State(state): State<AppState>, request: Request) -> Result<Response> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = format!("{}{}", state.backend_url(), path_and_query);

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ServerError::RequestBody(e.to_string()))?;

    let mut headers = strip_hop_by_hop(&parts.headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    let mut upstream = state
        .upstream()
        .request(parts.method.clone(), &url)
        .headers(headers);
    if !body.is_empty() {
        upstream = upstream.body(body);
    }

    state.metrics().record_proxy_request();
    let started = Instant::now();
    let upstream = upstream.send().await.map_err(|e| {
        state.metrics().record_proxy_error();
        tracing::warn!(
            method = %parts.method,
            path = parts.uri.path(),
            error = %e,
            "Backend request failed"
        );
        ServerError::Upstream(e)
    })?;

    tracing::debug!(
        method = %parts.method,
        path = parts.uri.path(),
        status = upstream.status().as_u16(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Proxied request"
    );

    let status = upstream.status();
    let headers = strip_hop_by_hop(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Copy `headers` without hop-by-hop headers, including any the `Connection`
/// header names.
#[must_use]
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();

    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()) && !named.contains(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
