//! Shared router state.

use crate::error::{Result, ServerError};
use crate::metrics::Metrics;
use milkman_core::ServerConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State shared by every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ServerConfig,
    /// Backend base URL without a trailing slash
    backend_url: String,
    upstream: reqwest::Client,
    metrics: Metrics,
    started: Instant,
}

impl AppState {
    /// Build state for `config`.
    ///
    /// # Errors
    /// Returns error if the proxy prefix is malformed or the upstream HTTP
    /// client cannot be created.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let prefix = config.proxy_prefix.as_str();
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(ServerError::Configuration(format!(
                "proxy_prefix must look like \"/name\", got {prefix:?}"
            )));
        }

        // Redirects are passed through to the browser untouched.
        let upstream = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.proxy_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                ServerError::Configuration(format!("failed to create upstream client: {e}"))
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                backend_url: config.backend_url.trim_end_matches('/').to_string(),
                config,
                upstream,
                metrics: Metrics::default(),
                started: Instant::now(),
            }),
        })
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Backend base URL, no trailing slash.
    #[must_use]
    pub fn backend_url(&self) -> &str {
        &self.inner.backend_url
    }

    /// HTTP client used for forwarding.
    #[must_use]
    pub fn upstream(&self) -> &reqwest::Client {
        &self.inner.upstream
    }

    /// Request counters.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Time since the state was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.inner.started.elapsed()
    }
}
