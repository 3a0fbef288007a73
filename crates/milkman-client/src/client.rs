//! The configured HTTP client.

use crate::api::{Customers, Health, Orders, Products, Subscriptions};
use crate::error::{ClientError, RefreshError, Result};
use crate::refresh::RefreshCoordinator;
use crate::response::ApiResponse;
use async_trait::async_trait;
use milkman_auth::{AuthError, Authenticator, Credentials, SessionHooks, TokenResponse, TokenStore};
use milkman_core::ApiConfig;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;

const AUTHENTICATE_PATH: &str = "/customer/authenticate";
const REFRESH_PATH: &str = "/customer/refresh-token";

/// A request to the backend, replayable after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    /// Request `path` (relative to the API base URL) with `method`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach an already-built JSON body.
    #[must_use]
    pub fn body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// HTTP client for the Milkman API.
///
/// Every request carries the stored access token. A 401 (real, or logical via
/// `statusCode`) is recovered by refreshing the token once and replaying the
/// request with the new one.
pub struct ApiClient {
    http: Client,
    base_url: String,
    store: Arc<TokenStore>,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    /// Build a client from the `[api]` configuration section.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &ApiConfig, store: Arc<TokenStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self::with_http_client(http, &config.base_url, store))
    }

    /// Build a client around an existing `reqwest::Client`.
    pub fn with_http_client(http: Client, base_url: &str, store: Arc<TokenStore>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            refresh: RefreshCoordinator::new(Arc::clone(&store)),
            store,
        }
    }

    /// Notify `hooks` when a 401 cannot be recovered or identity changes on refresh.
    pub fn set_session_hooks<H: SessionHooks + 'static>(&self, hooks: &Arc<H>) {
        let weak: Weak<dyn SessionHooks> = Arc::downgrade(hooks) as Weak<dyn SessionHooks>;
        self.refresh.set_hooks(weak);
    }

    /// Base URL every path is joined to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Token store the client reads bearer tokens from.
    #[must_use]
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Refresh coordinator shared by all requests from this client.
    #[must_use]
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send `method path` with an optional JSON body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        self.execute(ApiRequest::new(method, path).body(body)).await
    }

    /// Send a request, recovering from one 401 through the refresh coordinator.
    ///
    /// The returned response may still carry a non-2xx status; see
    /// [`ApiResponse::error_for_status`].
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let token = self.store.access_token()?;
        let response = self.send(&request, token.as_deref()).await?;
        if response.status != 401 {
            return Ok(response);
        }

        tracing::debug!(path = %request.path, "Unauthorized, attempting token recovery");
        let token = self
            .refresh
            .recover(token.as_deref(), |refresh_token| {
                self.call_refresh(refresh_token)
            })
            .await?;

        // Replayed at most once; a second 401 is returned to the caller as is.
        self.send(&request, Some(&token)).await
    }

    /// Send a request and decode a successful body as `T`.
    pub async fn execute_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.execute(request).await?.error_for_status()?.json()
    }

    /// `GET path`, decoded.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute_json(ApiRequest::new(Method::GET, path)).await
    }

    /// `POST path` with a JSON body, decoded.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute_json(ApiRequest::new(Method::POST, path).json(body)?)
            .await
    }

    /// `PUT path` with a JSON body, decoded.
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.execute_json(ApiRequest::new(Method::PUT, path).json(body)?)
            .await
    }

    /// `DELETE path`, checking only the status.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(ApiRequest::new(Method::DELETE, path))
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Customer endpoints.
    #[must_use]
    pub fn customers(&self) -> Customers<'_> {
        Customers::new(self)
    }

    /// Product endpoints.
    #[must_use]
    pub fn products(&self) -> Products<'_> {
        Products::new(self)
    }

    /// Order endpoints.
    #[must_use]
    pub fn orders(&self) -> Orders<'_> {
        Orders::new(self)
    }

    /// Subscription endpoints.
    #[must_use]
    pub fn subscriptions(&self) -> Subscriptions<'_> {
        Subscriptions::new(self)
    }

    /// Backend health endpoints.
    #[must_use]
    pub fn health(&self) -> Health<'_> {
        Health::new(self)
    }

    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .header(header::ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let http_status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let decoded = ApiResponse::from_parts(http_status, &bytes);

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            http_status,
            status = decoded.status,
            "API request completed"
        );
        Ok(decoded)
    }

    /// POST the refresh token outside the 401 handling path.
    async fn call_refresh(&self, refresh_token: String) -> std::result::Result<TokenResponse, RefreshError> {
        let response = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let http_status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        let decoded = ApiResponse::from_parts(http_status, &bytes);

        if !decoded.is_success() {
            return Err(RefreshError::Rejected {
                status: Some(decoded.status),
                message: decoded
                    .message()
                    .unwrap_or_else(|| "refresh endpoint returned an error".to_string()),
            });
        }

        let status = decoded.status;
        let body: TokenResponse =
            serde_json::from_value(decoded.data).map_err(|e| RefreshError::Rejected {
                status: Some(status),
                message: format!("unreadable refresh response: {e}"),
            })?;

        match body.status.as_deref() {
            None | Some("SUCCESS") => Ok(body),
            Some(other) => Err(RefreshError::Rejected {
                status: Some(status),
                message: body
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("refresh status {other}")),
            }),
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for ApiClient {
    async fn authenticate(&self, credentials: &Credentials) -> milkman_auth::Result<TokenResponse> {
        let request = ApiRequest::new(Method::POST, AUTHENTICATE_PATH)
            .json(credentials)
            .map_err(|e| AuthError::Backend {
                status: None,
                message: Some(e.to_string()),
            })?;

        // Login is never routed through token recovery: a 401 here means bad
        // credentials, not an expired session.
        let response = self.send(&request, None).await.map_err(|e| {
            tracing::warn!(error = %e, "Authentication request failed");
            AuthError::Backend {
                status: None,
                message: None,
            }
        })?;

        if !response.is_success() {
            return Err(AuthError::Backend {
                status: Some(response.status),
                message: response.message(),
            });
        }

        let status = response.status;
        serde_json::from_value(response.data).map_err(|e| {
            tracing::warn!(error = %e, "Unreadable authentication response");
            AuthError::Backend {
                status: Some(status),
                message: None,
            }
        })
    }
}
