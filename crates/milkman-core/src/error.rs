//! Error types shared by the Milkman crates.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the shared data model and configuration.
#[derive(Error, Debug)]
pub enum MilkmanError {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A customer identifier was empty or whitespace
    #[error("customer id must not be empty")]
    EmptyCustomerId,
}

/// Errors loading, saving or validating [`AppConfig`](crate::AppConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No home directory, so no platform config or data directory either
    #[error("no config directory available for the current user")]
    NoProjectDirs,

    /// The config file exists but could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// File that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file or its directory could not be written
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// File or directory that was being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`AppConfig`](crate::AppConfig)
    #[error("{} is not a valid config file: {source}", path.display())]
    Parse {
        /// File that was parsed
        path: PathBuf,
        /// TOML decoding error
        #[source]
        source: toml::de::Error,
    },

    /// The in-memory config could not be encoded as TOML
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A value is out of range, unparsable, or inconsistent with another
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field name or environment variable
        field: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type alias using `MilkmanError`.
pub type Result<T> = std::result::Result<T, MilkmanError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            field: "session.warning_minutes".to_string(),
            reason: "must be smaller than timeout_minutes".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid config value for session.warning_minutes: must be smaller than timeout_minutes"
        );
    }

    #[test]
    fn test_read_error_names_path() {
        let err = ConfigError::Read {
            path: PathBuf::from("/etc/milkman/config.toml"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("failed to read /etc/milkman/config.toml"));

        let err: MilkmanError = err.into();
        assert!(matches!(err, MilkmanError::Config(ConfigError::Read { .. })));
    }
}
