//! Scoped subscriptions.

use std::fmt;
use std::sync::Weak;

use crate::domain::foundation::EventKey;
use crate::ports::Handler;

use super::DispatchRegistry;

/// A live subscription that is removed when the guard is dropped.
///
/// Holds the registry weakly: a guard outliving its registry is harmless.
/// The registration only goes away once no guard and no plain
/// `subscribe` holds it any more.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard {
    registry: Weak<DispatchRegistry>,
    key: EventKey,
    handler: Handler,
    registration: u64,
}

impl SubscriptionGuard {
    pub(crate) fn new(
        registry: Weak<DispatchRegistry>,
        key: EventKey,
        handler: Handler,
        registration: u64,
    ) -> Self {
        Self {
            registry,
            key,
            handler,
            registration,
        }
    }

    /// The key this guard is registered under.
    pub fn event_type(&self) -> &str {
        self.key.as_str()
    }

    #[cfg(test)]
    pub(crate) fn registration_id(&self) -> u64 {
        self.registration
    }

    /// Unsubscribe now. Same as dropping the guard.
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("key", &self.key)
            .field("handler", &self.handler)
            .finish()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.key, &self.handler, self.registration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::EventSubscriber;
    use std::sync::Arc;

    #[test]
    fn dropping_guard_unsubscribes() {
        let registry = Arc::new(DispatchRegistry::new());
        let guard = registry
            .subscribe_scoped("tasks.created", Handler::payload_fn("h", |_| Ok(())))
            .unwrap();

        assert_eq!(guard.event_type(), "tasks.created");
        assert_eq!(registry.handler_count("tasks.created"), 1);

        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn explicit_unsubscribe_consumes_guard() {
        let registry = Arc::new(DispatchRegistry::new());
        let guard = registry
            .subscribe_scoped("*", Handler::envelope_fn("w", |_| Ok(())))
            .unwrap();

        guard.unsubscribe();
        assert!(registry.is_empty());
    }

    #[test]
    fn guard_outliving_registry_is_harmless() {
        let registry = Arc::new(DispatchRegistry::new());
        let guard = registry
            .subscribe_scoped("a", Handler::payload_fn("h", |_| Ok(())))
            .unwrap();

        drop(registry);
        drop(guard);
    }

    #[test]
    fn guard_does_not_remove_plain_subscription_of_same_handler() {
        let registry = Arc::new(DispatchRegistry::new());
        let handler = Handler::payload_fn("h", |_| Ok(()));

        registry.subscribe("a", handler.clone()).unwrap();
        drop(registry.subscribe_scoped("a", handler.clone()).unwrap());

        assert_eq!(registry.handler_count("a"), 1);

        registry.unsubscribe("a", &handler);
        assert!(registry.is_empty());
    }

    #[test]
    fn guards_sharing_a_handler_keep_it_until_the_last_drops() {
        let registry = Arc::new(DispatchRegistry::new());
        let handler = Handler::payload_fn("h", |_| Ok(()));

        let first = registry.subscribe_scoped("a", handler.clone()).unwrap();
        let second = registry.subscribe_scoped("a", handler.clone()).unwrap();
        assert_eq!(registry.handler_count("a"), 1);

        drop(first);
        assert_eq!(registry.handler_count("a"), 1);

        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn plain_subscribe_after_guard_outlives_the_guard() {
        let registry = Arc::new(DispatchRegistry::new());
        let handler = Handler::payload_fn("h", |_| Ok(()));

        let guard = registry.subscribe_scoped("a", handler.clone()).unwrap();
        registry.subscribe("a", handler.clone()).unwrap();
        drop(guard);

        assert_eq!(registry.handler_count("a"), 1);
    }

    #[test]
    fn stale_guard_leaves_later_registration_alone() {
        let registry = Arc::new(DispatchRegistry::new());
        let handler = Handler::payload_fn("h", |_| Ok(()));

        let stale = registry.subscribe_scoped("a", handler.clone()).unwrap();
        registry.unsubscribe("a", &handler);
        let fresh = registry.subscribe_scoped("a", handler.clone()).unwrap();

        drop(stale);
        assert_eq!(registry.handler_count("a"), 1);

        drop(fresh);
        assert!(registry.is_empty());
    }

    #[test]
    fn scoped_subscribe_validates_key() {
        let registry = Arc::new(DispatchRegistry::new());
        assert!(registry
            .subscribe_scoped("", Handler::payload_fn("h", |_| Ok(())))
            .is_err());
    }
}
