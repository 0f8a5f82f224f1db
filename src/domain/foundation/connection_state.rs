//! Connection lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::StateMachine;

/// Lifecycle state of the single logical connection of a session.
///
/// ```text
/// Idle ──start──▶ Connecting ──ok──▶ Connected
///                   │   ▲              │
///             fail  │   │ delay        │ disconnect
///                   ▼   │              ▼
///                 Reconnecting ◀───────┘
///                   │
///                   └── cap reached ──▶ Failed
///
/// any state ──stop──▶ Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Created, never started.
    #[default]
    Idle,
    /// A transport connect is in flight.
    Connecting,
    /// Handshake done; envelopes are flowing.
    Connected,
    /// Waiting out the fixed delay before the next attempt.
    Reconnecting,
    /// Reconnect cap exhausted; real-time sync is disabled for the session.
    Failed,
    /// Torn down explicitly.
    Disconnected,
}

impl ConnectionState {
    /// True while the manager may still reach `Connected` on its own.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        )
    }
}

impl StateMachine for ConnectionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connecting, Failed)
                | (Connected, Reconnecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, Failed)
                | (Idle, Disconnected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Reconnecting, Disconnected)
                | (Failed, Disconnected)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use ConnectionState::*;
        match self {
            Idle => vec![Connecting, Disconnected],
            Connecting => vec![Connected, Reconnecting, Failed, Disconnected],
            Connected => vec![Reconnecting, Disconnected],
            Reconnecting => vec![Connecting, Failed, Disconnected],
            Failed => vec![Disconnected],
            Disconnected => vec![],
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}
