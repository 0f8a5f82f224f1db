//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, enums, and error types
//! that form the vocabulary of the real-time sync bridge.

mod connection_state;
mod envelope;
mod errors;
mod event_key;
mod ids;
mod state_machine;
mod timestamp;

pub use connection_state::ConnectionState;
pub use envelope::{EventEnvelope, SubscriptionRequest};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use event_key::{EventKey, WILDCARD};
pub use ids::SessionId;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
