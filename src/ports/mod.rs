//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the bridge and the outside world. Adapters implement these ports.
//!
//! ## Event Ports
//!
//! - `EventSubscriber` - Register/remove handlers by event type
//! - `EventDispatcher` - Route one envelope to every matching handler
//! - `EventHandler` / `EnvelopeHandler` - Typed and wildcard handlers
//!
//! ## Transport Ports
//!
//! - `Transport` - Opens connections to the event source
//! - `TransportConnection` - One open bidirectional connection

mod event_subscriber;
mod transport;

pub use event_subscriber::{
    DispatchReport, EnvelopeHandler, EventDispatcher, EventHandler, EventSubscriber, Handler,
};
pub use transport::{Transport, TransportConnection, TransportError};
