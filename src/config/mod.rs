//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `REALTIME_SYNC` prefix and nested values use double underscores as separators.
//! Every value has a default, so an empty environment is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use realtime_sync::config::SyncConfig;
//!
//! let config = SyncConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Syncing from {}", config.endpoint.resolve().unwrap());
//! ```

mod connection;
mod endpoint;
mod error;
mod logging;

pub use connection::ConnectionConfig;
pub use endpoint::EndpointConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;

use serde::Deserialize;

/// Root configuration of a real-time sync session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    /// Reconnect policy and connect bounds
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Endpoint resolution inputs
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Log output of the binary
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `REALTIME_SYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `REALTIME_SYNC__CONNECTION__MAX_RECONNECT_ATTEMPTS=10` -> `connection.max_reconnect_attempts = 10`
    /// - `REALTIME_SYNC__ENDPOINT__API_BASE_URL=...` -> `endpoint.api_base_url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("REALTIME_SYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.connection.validate()?;
        self.endpoint.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// The resolved WebSocket endpoint
    pub fn endpoint_url(&self) -> Result<String, ValidationError> {
        self.endpoint.resolve()
    }
}
