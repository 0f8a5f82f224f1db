//! Connection lifecycle configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::connection::ConnectionManagerConfig;

const MAX_RECONNECT_ATTEMPTS: u32 = 100;
const MAX_CONNECT_TIMEOUT_MS: u64 = 120_000;

/// Reconnect policy and connect bounds
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Consecutive failed reconnects before real-time sync is disabled
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Fixed delay between reconnect attempts in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound for one connect attempt in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Buffer size of the lifecycle event channel
    #[serde(default = "default_lifecycle_channel_capacity")]
    pub lifecycle_channel_capacity: usize,
}

impl ConnectionConfig {
    /// Get reconnect delay as Duration
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Settings for the connection manager
    pub fn manager_config(&self) -> ConnectionManagerConfig {
        ConnectionManagerConfig {
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_delay: self.reconnect_delay(),
            connect_timeout: self.connect_timeout(),
            lifecycle_capacity: self.lifecycle_channel_capacity,
        }
    }

    /// Validate connection configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            return Err(ValidationError::TooManyReconnectAttempts);
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ValidationError::InvalidReconnectDelay);
        }
        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > MAX_CONNECT_TIMEOUT_MS {
            return Err(ValidationError::InvalidConnectTimeout);
        }
        if self.lifecycle_channel_capacity == 0 {
            return Err(ValidationError::InvalidChannelCapacity);
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            lifecycle_channel_capacity: default_lifecycle_channel_capacity(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_lifecycle_channel_capacity() -> usize {
    64
}
