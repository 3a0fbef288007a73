//! Server error type and its HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the front server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The backend could not be reached or did not answer in time
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The incoming request body could not be buffered
    #[error("failed to read request body: {0}")]
    RequestBody(String),

    /// Server configuration is unusable
    #[error("invalid server configuration: {0}")]
    Configuration(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable kind
    pub error: &'static str,
    /// Human-readable message
    pub message: String,
}

impl ServerError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Upstream(e) if e.is_timeout() => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
            Self::RequestBody(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_server_error"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_kind();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                error,
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_error_is_client_error() {
        let response = ServerError::RequestBody("length limit exceeded".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_configuration_error_is_internal() {
        let response = ServerError::Configuration("proxy prefix".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
