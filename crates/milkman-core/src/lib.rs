//! Milkman Core - Foundation crate for the Milkman session layer.
//!
//! This crate provides the shared types, error handling, configuration and
//! clock abstraction that the auth, client and server crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`types`] - Session data model (`Session`, `UserIdentity`, `Role`)
//! - [`clock`] - Wall-clock abstraction so session timing can be tested
//!
//! # Example
//!
//! ```rust
//! use milkman_core::{AppConfig, Role, UserIdentity};
//!
//! let config = AppConfig::default();
//! assert_eq!(config.session.timeout_minutes, 30);
//!
//! let user = UserIdentity::new("ADMIN001", "Admin", Role::Admin);
//! assert!(user.is_admin());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ApiConfig, AppConfig, LoggingConfig, Persistence, ServerConfig, SessionConfig,
};
pub use error::{ConfigError, ConfigResult, MilkmanError, Result};
pub use types::{CustomerId, Role, Session, UserIdentity};
