use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found at path: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to serialize configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value at {path}: {message}")]
    ValidationError { path: String, message: String },

    #[error("Unknown retry policy: {0}")]
    UnknownPolicy(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    pub(crate) fn invalid(path: impl Into<String>, message: impl ToString) -> Self {
        ConfigError::ValidationError {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
