//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `dispatch` - Handler registry, scoped subscriptions, refetch-on-event
//! - `connection` - Connection lifecycle and reconnect policy
//! - `transport` - WebSocket and in-memory transports

pub mod connection;
pub mod dispatch;
pub mod transport;

pub use connection::{ConnectionEvent, ConnectionManager, ConnectionManagerConfig, ConnectionSnapshot};
pub use dispatch::{DispatchRegistry, RefetchCallback, RefetchOnEvent, SubscriptionGuard};
pub use transport::{InMemoryPeer, InMemoryTransport, WebSocketTransport};
