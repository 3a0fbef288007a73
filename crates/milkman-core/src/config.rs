//! Configuration management for Milkman.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/milkman/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend REST API settings
    pub api: ApiConfig,
    /// Session lifetime and persistence settings
    pub session: SessionConfig,
    /// Static/proxy web server settings
    pub server: ServerConfig,
    /// Log output settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if absent.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();

        let config: Self = if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!("Config file not found, using defaults");
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `MILKMAN_API_BASE_URL`: Override the backend API base URL
    /// - `MILKMAN_SESSION_TIMEOUT_MINUTES`: Override the inactivity timeout
    /// - `MILKMAN_SESSION_WARNING_MINUTES`: Override the warning lead time
    /// - `MILKMAN_BACKEND_URL`: Override the proxy target
    /// - `MILKMAN_STATIC_DIR`: Override the static asset directory
    /// - `PORT`: Override the server listen port
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup function.
    ///
    /// Taking the lookup as a parameter keeps this testable without mutating
    /// the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MILKMAN_API_BASE_URL") {
            tracing::debug!("Override api.base_url from env: {}", val);
            self.api.base_url = val;
        }

        if let Some(val) = lookup("MILKMAN_SESSION_TIMEOUT_MINUTES") {
            self.session.timeout_minutes = parse_env("MILKMAN_SESSION_TIMEOUT_MINUTES", &val)?;
            tracing::debug!(
                "Override session.timeout_minutes from env: {}",
                self.session.timeout_minutes
            );
        }

        if let Some(val) = lookup("MILKMAN_SESSION_WARNING_MINUTES") {
            self.session.warning_minutes = parse_env("MILKMAN_SESSION_WARNING_MINUTES", &val)?;
            tracing::debug!(
                "Override session.warning_minutes from env: {}",
                self.session.warning_minutes
            );
        }

        if let Some(val) = lookup("MILKMAN_BACKEND_URL") {
            tracing::debug!("Override server.backend_url from env: {}", val);
            self.server.backend_url = val;
        }

        if let Some(val) = lookup("MILKMAN_STATIC_DIR") {
            tracing::debug!("Override server.static_dir from env: {}", val);
            self.server.static_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("PORT") {
            let port: u16 = parse_env("PORT", &val)?;
            let host = self
                .server
                .bind_addr
                .rsplit_once(':')
                .map_or("0.0.0.0", |(host, _)| host)
                .to_string();
            self.server.bind_addr = format!("{host}:{port}");
            tracing::debug!("Override server.bind_addr from env: {}", self.server.bind_addr);
        }

        Ok(())
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> ConfigResult<()> {
        self.session.validate()
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(Self::config_path()?)
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let config_dir = path.parent().ok_or_else(|| ConfigError::InvalidValue {
            field: "config_path".to_string(),
            reason: "no parent directory".to_string(),
        })?;

        fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/milkman/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/milkman`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("com", "milkman", "milkman").ok_or(ConfigError::NoProjectDirs)
}

fn parse_env<T: std::str::FromStr>(field: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("cannot parse '{value}'"),
    })
}

/// Backend REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every API path is appended to
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/milkman".to_string(),
            timeout_secs: 10,
            user_agent: format!("milkman-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where session tokens are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Survives restarts ("remember me")
    #[default]
    Durable,
    /// Lost when the process ends ("logout on close")
    Session,
}

/// Session lifetime and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Minutes of inactivity before forced logout
    pub timeout_minutes: u32,
    /// Minutes before the timeout at which the warning fires
    pub warning_minutes: u32,
    /// Whether the inactivity monitor runs at all
    pub enabled: bool,
    /// Persistence scope applied to every session key
    pub persistence: Persistence,
    /// Storage document for durable persistence (defaults to `<data_dir>/session.json`)
    pub storage_file: Option<PathBuf>,
}

impl SessionConfig {
    /// Check that the warning fires strictly before the timeout.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.timeout_minutes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.warning_minutes >= self.timeout_minutes {
            return Err(ConfigError::InvalidValue {
                field: "session.warning_minutes".to_string(),
                reason: "must be smaller than timeout_minutes".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the durable storage path, defaulting into the data directory.
    pub fn storage_path(&self) -> ConfigResult<PathBuf> {
        match &self.storage_file {
            Some(path) => Ok(path.clone()),
            None => Ok(AppConfig::data_dir()?.join("session.json")),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 30,
            warning_minutes: 2,
            enabled: true,
            persistence: Persistence::Durable,
            storage_file: None,
        }
    }
}

/// Static file and reverse-proxy server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_addr: String,
    /// Directory holding the built front-end (`index.html`, `assets/`)
    pub static_dir: PathBuf,
    /// Backend the API prefix is proxied to
    pub backend_url: String,
    /// Path prefix forwarded to the backend
    pub proxy_prefix: String,
    /// Upstream request timeout in seconds
    pub proxy_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".to_string(),
            static_dir: PathBuf::from("dist"),
            backend_url: "http://milkman-app:8081".to_string(),
            proxy_prefix: "/milkman".to_string(),
            proxy_timeout_secs: 30,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,milkman=debug".to_string(),
            json: false,
        }
    }
}
