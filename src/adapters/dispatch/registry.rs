//! Dispatch registry - fans pushed envelopes out to interested handlers.
//!
//! Handlers are kept per event type, plus one set under the wildcard key.
//! Dispatch runs against a point-in-time snapshot of the matching sets,
//! so handlers may subscribe or unsubscribe (themselves included) while a
//! dispatch is in flight without deadlocking or invalidating iteration.
//!
//! A handler appears at most once per key. Plain `subscribe` and every
//! live `SubscriptionGuard` each hold that one registration; it goes away
//! when the last holder lets go, or at once on an explicit `unsubscribe`.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope, EventKey};
use crate::ports::{DispatchReport, EventDispatcher, EventSubscriber, Handler};

use super::guard::SubscriptionGuard;

/// One handler under one key, and who is keeping it there.
struct Registration {
    id: u64,
    handler: Handler,
    plain: bool,
    guards: usize,
}

/// How a registration is being taken.
#[derive(Clone, Copy)]
enum Holder {
    Plain,
    Guard,
}

type HandlerMap = HashMap<EventKey, Vec<Registration>>;

/// Registry of handlers keyed by event type.
///
/// Features:
/// - Set semantics per key (handlers compared by identity)
/// - Empty keys are removed, so the key set only names live interest
/// - Per-handler failure containment, including panics
///
/// # Example
///
/// ```ignore
/// let registry = Arc::new(DispatchRegistry::new());
/// registry.subscribe("tasks.created", on_task.clone())?;
/// registry.subscribe("*", audit_log)?;
///
/// registry.dispatch(&EventEnvelope::new("tasks.created", json!({"id": 1})));
/// ```
#[derive(Default)]
pub struct DispatchRegistry {
    handlers: RwLock<HandlerMap>,
    next_id: AtomicU64,
}

impl DispatchRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe and get a guard that unsubscribes when dropped.
    ///
    /// If the handler is already registered under this key, the guard
    /// shares that registration and keeps it alive while it lives.
    pub fn subscribe_scoped(
        self: &Arc<Self>,
        event_type: &str,
        handler: Handler,
    ) -> Result<SubscriptionGuard, DomainError> {
        let (key, id) = self.insert(event_type, handler.clone(), Holder::Guard)?;
        Ok(SubscriptionGuard::new(Arc::downgrade(self), key, handler, id))
    }

    /// Event-type keys that currently have at least one handler.
    ///
    /// The wildcard shows up as `"*"`. Sorted for stable output.
    pub fn event_types(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().map(|k| k.as_str().to_string()).collect();
        keys.sort();
        keys
    }

    /// Number of handlers registered under `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        let Ok(key) = EventKey::parse(event_type) else {
            return 0;
        };
        self.read().get(&key).map_or(0, Vec::len)
    }

    /// True when no handler is registered under any key.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drops every registration.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Let go of one guard's hold on registration `id`.
    ///
    /// A registration replaced since the guard was taken (same handler,
    /// new id) is left alone.
    pub(crate) fn release(&self, key: &EventKey, handler: &Handler, id: u64) {
        let mut handlers = self.write();
        let Some(set) = handlers.get_mut(key) else {
            return;
        };
        let Some(pos) = set
            .iter()
            .position(|r| r.id == id && r.handler.same_as(handler))
        else {
            return;
        };

        let registration = &mut set[pos];
        registration.guards = registration.guards.saturating_sub(1);
        if registration.guards == 0 && !registration.plain {
            set.remove(pos);
        }
        if set.is_empty() {
            handlers.remove(key);
        }
    }

    fn insert(
        &self,
        event_type: &str,
        handler: Handler,
        holder: Holder,
    ) -> Result<(EventKey, u64), DomainError> {
        let key = EventKey::parse(event_type).map_err(|e| {
            DomainError::new(ErrorCode::InvalidEventType, e.to_string())
                .with_detail("handler", handler.name())
        })?;

        if key.is_wildcard() != handler.is_envelope() {
            let expected = if key.is_wildcard() { "an envelope" } else { "a payload" };
            return Err(DomainError::new(
                ErrorCode::HandlerMismatch,
                format!("Key '{}' requires {} handler", key, expected),
            )
            .with_detail("handler", handler.name()));
        }

        let mut handlers = self.write();
        let set = handlers.entry(key.clone()).or_default();
        let pos = match set.iter().position(|r| r.handler.same_as(&handler)) {
            Some(pos) => pos,
            None => {
                set.push(Registration {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    handler,
                    plain: false,
                    guards: 0,
                });
                set.len() - 1
            }
        };
        let registration = &mut set[pos];
        match holder {
            Holder::Plain => registration.plain = true,
            Holder::Guard => registration.guards += 1,
        }

        Ok((key, registration.id))
    }

    fn remove(&self, key: &EventKey, handler: &Handler) {
        let mut handlers = self.write();
        let Some(set) = handlers.get_mut(key) else {
            return;
        };

        set.retain(|r| !r.handler.same_as(handler));
        if set.is_empty() {
            handlers.remove(key);
        }
    }

    fn snapshot(&self, key: &EventKey) -> Vec<Handler> {
        self.read()
            .get(key)
            .map(|set| set.iter().map(|r| r.handler.clone()).collect())
            .unwrap_or_default()
    }

    // Handlers never run under the lock, so a poisoned lock still holds a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HandlerMap> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HandlerMap> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSubscriber for DispatchRegistry {
    fn subscribe(&self, event_type: &str, handler: Handler) -> Result<(), DomainError> {
        self.insert(event_type, handler, Holder::Plain).map(|_| ())
    }

    fn unsubscribe(&self, event_type: &str, handler: &Handler) {
        if let Ok(key) = EventKey::parse(event_type) {
            self.remove(&key, handler);
        }
    }
}

impl EventDispatcher for DispatchRegistry {
    fn dispatch(&self, envelope: &EventEnvelope) -> DispatchReport {
        let type_handlers = self.snapshot(&EventKey::Type(envelope.event_type.clone()));
        let wildcard_handlers = self.snapshot(&EventKey::Wildcard);

        let mut report = DispatchReport::default();
        for handler in type_handlers.iter().chain(wildcard_handlers.iter()) {
            if invoke(handler, envelope) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.invoked() == 0 {
            tracing::trace!(event_type = %envelope.event_type, "No handlers for event");
        }

        report
    }
}

/// Runs one handler, containing errors and panics. Returns true on success.
fn invoke(handler: &Handler, envelope: &EventEnvelope) -> bool {
    let outcome = catch_unwind(AssertUnwindSafe(|| match handler {
        Handler::Payload(h) => h.handle(&envelope.data),
        Handler::Envelope(h) => h.handle(envelope),
    }));

    match outcome {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(
                event_type = %envelope.event_type,
                handler = handler.name(),
                error = %e,
                "Event handler failed"
            );
            false
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(
                event_type = %envelope.event_type,
                handler = handler.name(),
                panic = %message,
                "Event handler panicked"
            );
            false
        }
    }
}
