//! Refetch-on-event: one zero-argument refresh callback subscribed to a
//! set of event types, payloads ignored.
//!
//! Consumers typically call [`RefetchOnEvent::sync`] on every render or
//! loop tick with a fresh closure. Re-registration is keyed only on the
//! *content* of the event-type set; a new closure is swapped in behind a
//! stable handler, so it never causes subscribe/unsubscribe churn.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::domain::foundation::{DomainError, EventKey};
use crate::ports::Handler;

use super::{DispatchRegistry, SubscriptionGuard};

/// Refresh callback invoked once per matching envelope.
pub type RefetchCallback = Arc<dyn Fn() + Send + Sync>;

/// A set of subscriptions sharing one refresh callback.
///
/// Dropping it unsubscribes from every event type.
pub struct RefetchOnEvent {
    registry: Arc<DispatchRegistry>,
    callback: Arc<RwLock<RefetchCallback>>,
    on_payload: Handler,
    on_envelope: Handler,
    event_types: BTreeSet<String>,
    guards: BTreeMap<String, SubscriptionGuard>,
    registrations: u64,
}

impl RefetchOnEvent {
    /// Subscribe `callback` to every type in `event_types`.
    pub fn new<F>(
        registry: Arc<DispatchRegistry>,
        event_types: &[&str],
        callback: F,
    ) -> Result<Self, DomainError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let initial: RefetchCallback = Arc::new(callback);
        let callback = Arc::new(RwLock::new(initial));

        let payload_slot = Arc::clone(&callback);
        let on_payload = Handler::payload_fn("refetch-on-event", move |_| {
            let refetch = current(&payload_slot);
            refetch();
            Ok(())
        });
        let envelope_slot = Arc::clone(&callback);
        let on_envelope = Handler::envelope_fn("refetch-on-event", move |_| {
            let refetch = current(&envelope_slot);
            refetch();
            Ok(())
        });

        let mut refetch = Self {
            registry,
            callback,
            on_payload,
            on_envelope,
            event_types: BTreeSet::new(),
            guards: BTreeMap::new(),
            registrations: 0,
        };
        refetch.resubscribe(event_types)?;
        Ok(refetch)
    }

    /// Swap in the latest callback and re-subscribe only if the set of
    /// event types changed.
    pub fn sync<F>(&mut self, event_types: &[&str], callback: F) -> Result<(), DomainError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let latest: RefetchCallback = Arc::new(callback);
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = latest;

        if normalize(event_types) == self.event_types {
            return Ok(());
        }
        self.resubscribe(event_types)
    }

    /// The event types currently subscribed, sorted.
    pub fn event_types(&self) -> Vec<String> {
        self.event_types.iter().cloned().collect()
    }

    /// How many times the subscription set was (re)registered.
    pub fn registration_count(&self) -> u64 {
        self.registrations
    }

    /// Types kept across a change stay registered throughout: added types
    /// are subscribed before removed ones are released.
    fn resubscribe(&mut self, event_types: &[&str]) -> Result<(), DomainError> {
        let wanted = normalize(event_types);
        let added = wanted
            .difference(&self.event_types)
            .map(|t| EventKey::parse(t))
            .collect::<Result<Vec<_>, _>>()?;

        let mut fresh = Vec::with_capacity(added.len());
        for key in added {
            let handler = if key.is_wildcard() {
                self.on_envelope.clone()
            } else {
                self.on_payload.clone()
            };
            let guard = self.registry.subscribe_scoped(key.as_str(), handler)?;
            fresh.push((key.as_str().to_string(), guard));
        }
        self.guards.extend(fresh);
        self.guards.retain(|event_type, _| wanted.contains(event_type));

        tracing::debug!(event_types = ?wanted, "Refetch subscriptions registered");
        self.event_types = wanted;
        self.registrations += 1;
        Ok(())
    }
}

fn current(slot: &RwLock<RefetchCallback>) -> RefetchCallback {
    Arc::clone(&slot.read().unwrap_or_else(PoisonError::into_inner))
}

fn normalize(event_types: &[&str]) -> BTreeSet<String> {
    event_types.iter().map(|t| (*t).to_string()).collect()
}
