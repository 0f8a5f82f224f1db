//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Reconnect attempts exceed maximum allowed (100)")]
    TooManyReconnectAttempts,

    #[error("Reconnect delay must be greater than zero")]
    InvalidReconnectDelay,

    #[error("Connect timeout must be between 1 and 120000 ms")]
    InvalidConnectTimeout,

    #[error("Lifecycle channel capacity must be greater than zero")]
    InvalidChannelCapacity,

    #[error("Invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("Namespace must start with '/': {0}")]
    InvalidNamespace(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}
