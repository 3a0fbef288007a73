//! Request counters and their Prometheus text rendering.

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide request counters.
#[derive(Debug, Default)]
pub struct Metrics {
    http_requests: AtomicU64,
    proxy_requests: AtomicU64,
    proxy_errors: AtomicU64,
}

impl Metrics {
    /// Count one handled HTTP request.
    pub fn record_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one request forwarded to the backend.
    pub fn record_proxy_request(&self) {
        self.proxy_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one forwarded request that got no backend response.
    pub fn record_proxy_error(&self) {
        self.proxy_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Total handled HTTP requests.
    #[must_use]
    pub fn http_requests(&self) -> u64 {
        self.http_requests.load(Ordering::Relaxed)
    }

    /// Total forwarded requests.
    #[must_use]
    pub fn proxy_requests(&self) -> u64 {
        self.proxy_requests.load(Ordering::Relaxed)
    }

    /// Total failed forwards.
    #[must_use]
    pub fn proxy_errors(&self) -> u64 {
        self.proxy_errors.load(Ordering::Relaxed)
    }

    /// Render all counters in the Prometheus text exposition format.
    #[must_use]
    pub fn render(&self, uptime: Duration) -> String {
        let mut out = String::new();
        write_metric(&mut out, "milkman_up", "Milkman front server is up", "gauge", "1");
        write_metric(
            &mut out,
            "milkman_uptime_seconds",
            "Uptime in seconds",
            "counter",
            &format!("{:.3}", uptime.as_secs_f64()),
        );
        write_metric(
            &mut out,
            "milkman_http_requests_total",
            "HTTP requests handled",
            "counter",
            &self.http_requests().to_string(),
        );
        write_metric(
            &mut out,
            "milkman_proxy_requests_total",
            "Requests forwarded to the backend",
            "counter",
            &self.proxy_requests().to_string(),
        );
        write_metric(
            &mut out,
            "milkman_proxy_errors_total",
            "Forwarded requests that failed without a backend response",
            "counter",
            &self.proxy_errors().to_string(),
        );
        out
    }
}

fn write_metric(out: &mut String, name: &str, help: &str, kind: &str, value: &str) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
    let _ = writeln!(out, "{name} {value}");
}

/// Middleware counting every request that reaches the router.
pub async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.metrics().record_request();
    next.run(request).await
}
