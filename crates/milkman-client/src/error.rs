//! Error types for the API client.

use milkman_auth::StorageError;
use thiserror::Error;

/// Why a token refresh did not produce a usable access token.
///
/// Cloned to every request that was waiting on the refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token was stored, so no refresh was attempted
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The backend answered but did not issue a new token
    #[error("token refresh rejected (status {status:?}): {message}")]
    Rejected {
        /// Effective HTTP status of the refresh response
        status: Option<u16>,
        /// Backend message or a description of what was missing
        message: String,
    },

    /// The refresh request never got a response
    #[error("token refresh failed: {0}")]
    Transport(String),

    /// Session storage failed while the refresh was in progress
    #[error("token refresh aborted by storage error: {0}")]
    Storage(String),

    /// The session was cleared while the request was in flight
    #[error("session ended before the request could be retried")]
    SessionEnded,

    /// The request driving the refresh was dropped before it finished
    #[error("token refresh was cancelled")]
    Cancelled,
}

/// Errors returned by [`ApiClient`](crate::ApiClient).
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure: no HTTP response was received
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request or response body could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid client configuration
    #[error("invalid client configuration: {0}")]
    Configuration(String),

    /// Reading or writing session tokens failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A 401 could not be recovered by refreshing the token
    #[error("session expired: {0}")]
    Refresh(#[from] RefreshError),

    /// The backend answered with a non-success effective status
    #[error("API error: status {status}, {message}")]
    Api {
        /// Effective status code
        status: u16,
        /// Backend message, or the canonical reason phrase
        message: String,
    },
}

impl ClientError {
    /// Effective status code, when the error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Refresh(RefreshError::Rejected { status, .. }) => *status,
            _ => None,
        }
    }

    /// Whether the session is gone and the user must log in again.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
