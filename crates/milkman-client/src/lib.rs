//! Milkman API Client
//!
//! HTTP access to the Milkman REST backend with bearer-token injection,
//! logical status normalization and single-flight token refresh.
//!
//! # Request Flow
//!
//! 1. The stored access token is attached as `Authorization: Bearer ...`
//! 2. A 200 response whose body carries a different `statusCode` is treated as
//!    that status
//! 3. An effective 401 hands the request to the [`RefreshCoordinator`]; one
//!    refresh runs no matter how many requests failed, and each is replayed
//!    once with the new token
//! 4. If the refresh fails, tokens are cleared and the session owner is told
//!    to log out
//!
//! # Example
//!
//! ```ignore
//! use milkman_client::{ApiClient, Page};
//! use serde_json::Value;
//!
//! let client = Arc::new(ApiClient::new(&config.api, store)?);
//! client.set_session_hooks(&session_manager);
//!
//! let orders: Vec<Value> = client.orders().list(None, Some(Page::new(0, 50))).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod api;
pub mod client;
pub mod error;
pub mod refresh;
pub mod response;

pub use api::{Customers, Health, Orders, Page, Products, Subscriptions};
pub use client::{ApiClient, ApiRequest};
pub use error::{ClientError, RefreshError, Result};
pub use refresh::RefreshCoordinator;
pub use reqwest::Method;
pub use response::{normalize_status, ApiResponse};
