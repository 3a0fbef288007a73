//! Milkman Session Layer
//!
//! Client-side authentication state for the Milkman web application: where
//! tokens live, when an idle session ends, and how login and logout change
//! both.
//!
//! # Components
//!
//! - [`TokenStore`] - the persisted session keys over a pluggable [`Storage`]
//! - [`SessionTimeoutMonitor`] - warning and hard-timeout timers reset by activity
//! - [`VisibilityObserver`] - staleness checks when the page returns from the background
//! - [`AuthSessionManager`] - login, logout, restore-on-load and `is_admin`
//!
//! # Session Lifetime
//!
//! - Inactivity timeout of 30 minutes with a warning 2 minutes before
//! - A page hidden for longer than the timeout is flagged expired and the
//!   next load starts logged out
//! - Token material in [`Session`](milkman_core::Session) values is zeroized on drop
//!
//! # Example
//!
//! ```ignore
//! use milkman_auth::{AuthSessionManager, FileStorage, TokenStore};
//!
//! let storage = Arc::new(FileStorage::open(config.session.storage_path()?)?);
//! let store = Arc::new(TokenStore::new(storage, Arc::new(SystemClock)));
//! let manager = AuthSessionManager::builder(store, api_client).build()?;
//!
//! manager.restore_on_load()?;
//! if !manager.is_authenticated() {
//!     manager.login("9876543210", "1234").await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod activity;
pub mod backend;
pub mod error;
pub mod session;
pub mod storage;
pub mod timeout;
pub mod timer;
pub mod token_store;
pub mod visibility;

pub use activity::{ActivityHub, ActivityKind, ActivitySource, PageEvent, Visibility};
pub use backend::{Authenticator, Credentials, LogoutReason, SessionHooks, TokenResponse};
pub use error::{AuthError, Result, StorageError, StorageResult};
pub use session::{AuthSessionManager, LoginOutcome, SessionEvent, LOGIN_ROUTE};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use timeout::{SessionTimeoutMonitor, TimeoutConfig, TimeoutState};
pub use timer::{Scheduler, TimerHandle, TokioScheduler};
pub use token_store::TokenStore;
pub use visibility::{VisibilityObserver, VisibilityOutcome};

use milkman_core::{Persistence, SessionConfig};
use std::sync::Arc;

/// Open the storage backend the `[session]` configuration asks for.
///
/// `Durable` opens the JSON document at [`SessionConfig::storage_path`];
/// `Session` keeps everything in memory for the life of the process.
pub fn open_storage(config: &SessionConfig) -> Result<Arc<dyn Storage>> {
    match config.persistence {
        Persistence::Durable => {
            let path = config
                .storage_path()
                .map_err(|e| AuthError::InvalidConfig(e.to_string()))?;
            Ok(Arc::new(FileStorage::open(path)?))
        }
        Persistence::Session => Ok(Arc::new(MemoryStorage::new())),
    }
}
