//! Lifecycle signals published by the connection manager.

use std::time::Duration;

use serde::Serialize;

use crate::domain::foundation::{ConnectionState, Timestamp};

/// One lifecycle signal. Broadcast to every `lifecycle_events()` receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// A transport connect is starting. `attempt` is 0 for the first try.
    Connecting { attempt: u32 },

    /// Handshake done; a new connection epoch began.
    Connected { epoch: u64 },

    /// An established connection was lost.
    Disconnected { reason: String },

    /// A connect attempt failed.
    ConnectError { error: String },

    /// The next attempt will start after `delay`.
    ReconnectScheduled {
        attempt: u32,
        #[serde(with = "millis")]
        delay: Duration,
    },

    /// The reconnect cap was hit; real-time sync is disabled for the session.
    ReconnectFailed { attempts: u32 },

    /// Torn down via `stop()`.
    Stopped,
}

/// Point-in-time view of a connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub epoch: u64,
    pub last_connected_at: Option<Timestamp>,
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(delay.as_millis() as u64)
    }
}
