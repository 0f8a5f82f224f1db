//! Transport port - Interface for the persistent bidirectional channel.
//!
//! The connection manager drives its state machine against these traits,
//! so it can be exercised without a network (see `InMemoryTransport`).

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Errors surfaced by transport adapters.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    Closed,

    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

impl From<TransportError> for DomainError {
    fn from(err: TransportError) -> Self {
        let code = match err {
            TransportError::Timeout(_) => ErrorCode::ConnectTimeout,
            _ => ErrorCode::TransportError,
        };
        DomainError::new(code, err.to_string())
    }
}

/// Factory for live connections to one endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `endpoint`.
    ///
    /// The caller applies its own connect timeout around this future.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TransportConnection>, TransportError>;
}

/// One open connection. Exclusively owned by the connection manager.
#[async_trait]
pub trait TransportConnection: Send {
    /// Send one text frame.
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// `Ok(None)` means the peer closed the connection. Must be cancel-safe:
    /// the manager races it against shutdown.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection. Errors are swallowed; the handle is released either way.
    async fn close(&mut self);
}
