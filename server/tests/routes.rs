//! Route tests driven through `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use milkman_core::ServerConfig;
use milkman_server::{router, AppState};
use serde_json::Value;
use std::fs;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_string, header as has_header, method, path, query_param};
use wiremock::{Mock, MockServer, Request as MockRequest, ResponseTemplate};

fn dist() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("assets")).unwrap();
    fs::write(dir.path().join("index.html"), "<!doctype html><div id=\"root\"></div>").unwrap();
    fs::write(dir.path().join("milk.svg"), "<svg/>").unwrap();
    fs::write(dir.path().join("assets/index-3f2a.js"), "console.log('milkman')").unwrap();
    dir
}

fn app(dist: &TempDir, backend_url: &str) -> (Router, AppState) {
    let state = AppState::new(ServerConfig {
        static_dir: dist.path().to_path_buf(),
        backend_url: backend_url.to_string(),
        ..ServerConfig::default()
    })
    .unwrap();
    (router(state.clone()), state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let dist = dist();
    let (app, _) = app(&dist, "http://127.0.0.1:9");

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], "UP");
    let timestamp = body["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_metrics_counts_requests() {
    let dist = dist();
    let (app, _) = app(&dist, "http://127.0.0.1:9");

    app.clone().oneshot(get("/health")).await.unwrap();
    app.clone().oneshot(get("/health")).await.unwrap();
    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let text = body_text(response).await;
    assert!(text.contains("milkman_up 1"));
    assert!(text.contains("milkman_http_requests_total 3"));
    assert!(text.contains("milkman_proxy_requests_total 0"));
}

#[tokio::test]
async fn test_client_routes_get_index_without_caching() {
    let dist = dist();
    let (app, _) = app(&dist, "http://127.0.0.1:9");

    for uri in ["/", "/login", "/admin/orders/42"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");
        assert!(body_text(response).await.contains("id=\"root\""));
    }
}

#[tokio::test]
async fn test_static_files_are_served() {
    let dist = dist();
    let (app, _) = app(&dist, "http://127.0.0.1:9");

    let response = app.oneshot(get("/milk.svg")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CACHE_CONTROL).is_none());
    assert_eq!(body_text(response).await, "<svg/>");
}

#[tokio::test]
async fn test_assets_are_immutable() {
    let dist = dist();
    let (app, _) = app(&dist, "http://127.0.0.1:9");

    let response = app.oneshot(get("/assets/index-3f2a.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );
}

#[tokio::test]
async fn test_missing_asset_is_not_index() {
    let dist = dist();
    let (app, _) = app(&dist, "http://127.0.0.1:9");

    let response = app.oneshot(get("/assets/missing-0000.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().get(header::CACHE_CONTROL).is_none());
}

#[tokio::test]
async fn test_proxy_forwards_request() {
    let backend = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/milkman/customer/update/C1"))
        .and(query_param("notify", "true"))
        .and(has_header("authorization", "Bearer abc"))
        .and(body_string("{\"customerName\":\"Asha\"}"))
        .respond_with(|req: &MockRequest| {
            // The proxy must not leak the front server's Host.
            let host = req.headers.get("host").and_then(|h| h.to_str().ok()).unwrap_or("");
            let status = if host == "milkman.example" { 400 } else { 200 };
            ResponseTemplate::new(status)
                .insert_header("x-request-id", "r-1")
                .set_body_json(serde_json::json!({"statusCode": "200"}))
        })
        .expect(1)
        .mount(&backend)
        .await;

    let dist = dist();
    let (app, state) = app(&dist, &backend.uri());

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/milkman/customer/update/C1?notify=true")
        .header(header::HOST, "milkman.example")
        .header(header::AUTHORIZATION, "Bearer abc")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"customerName\":\"Asha\"}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "r-1");
    assert!(body_text(response).await.contains("statusCode"));
    assert_eq!(state.metrics().proxy_requests(), 1);
    assert_eq!(state.metrics().proxy_errors(), 0);
}

#[tokio::test]
async fn test_proxy_passes_backend_errors_through() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/milkman/customer/getAll"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({"message": "expired"})))
        .mount(&backend)
        .await;

    let dist = dist();
    let (app, state) = app(&dist, &backend.uri());

    let response = app.oneshot(get("/milkman/customer/getAll")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(response).await.contains("expired"));
    assert_eq!(state.metrics().proxy_errors(), 0);
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let dist = dist();
    // Nothing listens on port 9 on a test host.
    let (app, state) = app(&dist, "http://127.0.0.1:9");

    let response = app.oneshot(get("/milkman/healthCheck")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"], "bad_gateway");
    assert_eq!(state.metrics().proxy_requests(), 1);
    assert_eq!(state.metrics().proxy_errors(), 1);
}
