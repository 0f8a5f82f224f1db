//! Transport adapters.
//!
//! - `WebSocketTransport` - Production transport over tokio-tungstenite
//! - `InMemoryTransport` - Scripted channels for tests

mod in_memory;
mod websocket;

pub use in_memory::{InMemoryPeer, InMemoryTransport};
pub use websocket::WebSocketTransport;
