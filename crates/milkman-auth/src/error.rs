//! Error types for session storage and authentication.

use thiserror::Error;

/// Errors raised by a [`Storage`](crate::storage::Storage) backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying file I/O failed
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The storage document could not be encoded or decoded
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the operation
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Authentication and session errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Persisting or reading session state failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The authentication backend could not be reached or answered with an
    /// HTTP error. `message` carries the backend's own explanation if it sent one.
    #[error("authentication backend error: {}", message.as_deref().unwrap_or("no response"))]
    Backend {
        /// HTTP status, absent for transport failures
        status: Option<u16>,
        /// Backend-supplied message
        message: Option<String>,
    },

    /// Invalid timeout or session configuration
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    /// Timers need a running tokio runtime
    #[error("no tokio runtime available for session timers")]
    NoRuntime,

    /// Operation requires a logged-in user
    #[error("not authenticated")]
    NotAuthenticated,
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
