//! EventSubscriber port - Interface for registering interest in pushed events.
//!
//! Consuming contexts (views, business modules) register handlers here
//! without knowing about the transport that delivers the events.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Handler for the `data` of envelopes of one event type.
///
/// Implementations should be:
/// - **Idempotent** - delivery is at-least-once across reconnect races
/// - **Quick** - dispatch runs handlers inline on the receive loop
/// - **Isolated** - a returned error (or a panic) only affects this handler
///
/// # Example
///
/// ```ignore
/// struct TaskListView { /* ... */ }
///
/// impl EventHandler for TaskListView {
///     fn handle(&self, data: &JsonValue) -> Result<(), DomainError> {
///         self.mark_stale();
///         Ok(())
///     }
///
///     fn name(&self) -> &str {
///         "TaskListView"
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Process the payload of one envelope.
    fn handle(&self, data: &JsonValue) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &str;
}

/// Handler registered under the wildcard key; receives whole envelopes.
pub trait EnvelopeHandler: Send + Sync {
    /// Process one envelope of any type.
    fn handle(&self, envelope: &EventEnvelope) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &str;
}

/// A registrable handler.
///
/// Handlers are compared by identity: clones of one `Handler` are the
/// same handler, two separately built handlers never are, even if they
/// wrap identical closures.
#[derive(Clone)]
pub enum Handler {
    /// Payload handler, valid under a concrete event type.
    Payload(Arc<dyn EventHandler>),
    /// Envelope handler, valid under the wildcard key.
    Envelope(Arc<dyn EnvelopeHandler>),
}

impl Handler {
    /// Builds a payload handler from a closure.
    pub fn payload_fn<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&JsonValue) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        Handler::Payload(Arc::new(FnHandler { name, f }))
    }

    /// Builds a wildcard envelope handler from a closure.
    pub fn envelope_fn<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&EventEnvelope) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        Handler::Envelope(Arc::new(FnHandler { name, f }))
    }

    /// Handler name for logging.
    pub fn name(&self) -> &str {
        match self {
            Handler::Payload(h) => h.name(),
            Handler::Envelope(h) => h.name(),
        }
    }

    /// True for handlers that expect whole envelopes.
    pub fn is_envelope(&self) -> bool {
        matches!(self, Handler::Envelope(_))
    }

    /// Identity comparison.
    pub fn same_as(&self, other: &Handler) -> bool {
        self.identity() == other.identity()
    }

    fn identity(&self) -> *const () {
        match self {
            Handler::Payload(h) => Arc::as_ptr(h) as *const (),
            Handler::Envelope(h) => Arc::as_ptr(h) as *const (),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_envelope() { "Envelope" } else { "Payload" };
        f.debug_struct("Handler")
            .field("kind", &kind)
            .field("name", &self.name())
            .finish()
    }
}

impl From<Arc<dyn EventHandler>> for Handler {
    fn from(handler: Arc<dyn EventHandler>) -> Self {
        Handler::Payload(handler)
    }
}

impl From<Arc<dyn EnvelopeHandler>> for Handler {
    fn from(handler: Arc<dyn EnvelopeHandler>) -> Self {
        Handler::Envelope(handler)
    }
}

struct FnHandler<F> {
    name: &'static str,
    f: F,
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&JsonValue) -> Result<(), DomainError> + Send + Sync,
{
    fn handle(&self, data: &JsonValue) -> Result<(), DomainError> {
        (self.f)(data)
    }

    fn name(&self) -> &str {
        self.name
    }
}

impl<F> EnvelopeHandler for FnHandler<F>
where
    F: Fn(&EventEnvelope) -> Result<(), DomainError> + Send + Sync,
{
    fn handle(&self, envelope: &EventEnvelope) -> Result<(), DomainError> {
        (self.f)(envelope)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Port for registering and removing handlers.
///
/// # Example
///
/// ```ignore
/// let on_task = Handler::payload_fn("task-list", |data| { /* ... */ Ok(()) });
/// subscriber.subscribe("tasks.created", on_task.clone())?;
/// subscriber.unsubscribe("tasks.created", &on_task);
/// ```
pub trait EventSubscriber: Send + Sync {
    /// Register `handler` under `event_type` (`"*"` for every envelope).
    ///
    /// Registering the same handler twice under one type is a no-op.
    fn subscribe(&self, event_type: &str, handler: Handler) -> Result<(), DomainError>;

    /// Remove `handler` from `event_type`. Unknown types and handlers are a no-op.
    fn unsubscribe(&self, event_type: &str, handler: &Handler);
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

impl DispatchReport {
    /// Total handler invocations.
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Port for routing one envelope to every matching handler.
///
/// Dispatch never fails and never suspends; handler failures are
/// contained and only show up in the report and the logs.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, envelope: &EventEnvelope) -> DispatchReport;
}
