//! Static file serving for the single-page web app.

use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

/// Cache policy for fingerprinted build assets.
pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Cache policy for HTML documents.
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Serve `/assets/*` from the build output; missing files are a plain 404.
pub async fn asset(State(state): State<AppState>, request: Request) -> Response {
    let mut response = serve_dir(&state, request).await;
    if response.status().is_success() {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE));
    }
    response
}

/// Serve a static file, or `index.html` for any other path so the client-side
/// router can take over.
pub async fn index(State(state): State<AppState>, request: Request) -> Response {
    if request.uri().path().starts_with("/assets/") {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }

    let method = request.method().clone();
    let headers = request.headers().clone();

    let mut response = serve_dir(&state, request).await;
    if response.status() == StatusCode::NOT_FOUND {
        let mut index_request = Request::new(Body::empty());
        *index_request.method_mut() = method;
        *index_request.headers_mut() = headers;

        let index = state.config().static_dir.join("index.html");
        response = match ServeFile::new(index).oneshot(index_request).await {
            Ok(response) => response.into_response(),
            Err(never) => match never {},
        };
    }

    if is_html(response.headers()) {
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }
    response
}

async fn serve_dir(state: &AppState, request: Request) -> Response {
    match ServeDir::new(&state.config().static_dir)
        .oneshot(request)
        .await
    {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"))
}
