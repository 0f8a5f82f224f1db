//! Connection adapters.
//!
//! - `ConnectionManager` - Lifecycle state machine with fixed-delay reconnect
//! - `ConnectionEvent` - Lifecycle signals broadcast to observers

mod events;
mod manager;

pub use events::{ConnectionEvent, ConnectionSnapshot};
pub use manager::{ConnectionManager, ConnectionManagerConfig};
