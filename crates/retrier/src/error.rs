//! Error types for retrier configuration

use thiserror::Error;

/// Result type alias using retrier's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading retry configuration
///
/// Failures of retried operations are reported through
/// [`RetryError`](crate::retry::RetryError) instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment override could not be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid environment value error
    pub fn invalid_env(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidEnv {
            var: var.into(),
            value: value.into(),
        }
    }
}
