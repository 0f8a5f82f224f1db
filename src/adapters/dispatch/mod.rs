//! Dispatch adapters.
//!
//! - `DispatchRegistry` - Event-type keyed handler sets with wildcard fan-out
//! - `SubscriptionGuard` - Subscription removed when dropped
//! - `RefetchOnEvent` - One refresh callback over a set of event types

mod guard;
mod refetch;
mod registry;

pub use guard::SubscriptionGuard;
pub use refetch::{RefetchCallback, RefetchOnEvent};
pub use registry::DispatchRegistry;
