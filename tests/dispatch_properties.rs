//! Registry laws checked over generated subscription sets.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value as JsonValue};

use realtime_sync::adapters::dispatch::DispatchRegistry;
use realtime_sync::domain::foundation::{DomainError, EventEnvelope};
use realtime_sync::ports::{EventDispatcher, EventSubscriber, Handler};

fn event_type() -> impl Strategy<Value = String> {
    "[a-z]{1,6}(\\.[a-z]{1,6})?"
}

fn counting(counter: &Arc<AtomicUsize>) -> Handler {
    let counter = Arc::clone(counter);
    Handler::payload_fn("counting", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn counting_wildcard(counter: &Arc<AtomicUsize>) -> Handler {
    let counter = Arc::clone(counter);
    Handler::envelope_fn("counting-wildcard", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn failing() -> Handler {
    Handler::payload_fn("failing", |_| Err(DomainError::handler_failed("boom")))
}

proptest! {
    #[test]
    fn subscribe_then_unsubscribe_restores_registry(
        existing in proptest::collection::vec(event_type(), 0..8),
        target in event_type(),
    ) {
        let registry = DispatchRegistry::new();
        for t in &existing {
            registry.subscribe(t, Handler::payload_fn("existing", |_| Ok(()))).unwrap();
        }
        let keys_before = registry.event_types();
        let count_before = registry.handler_count(&target);

        let handler = Handler::payload_fn("target", |_| Ok(()));
        registry.subscribe(&target, handler.clone()).unwrap();
        registry.unsubscribe(&target, &handler);

        prop_assert_eq!(registry.event_types(), keys_before);
        prop_assert_eq!(registry.handler_count(&target), count_before);
    }

    #[test]
    fn duplicate_subscribe_invokes_once(target in event_type(), repeats in 1usize..6) {
        let registry = DispatchRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting(&calls);

        for _ in 0..repeats {
            registry.subscribe(&target, handler.clone()).unwrap();
        }
        registry.dispatch(&EventEnvelope::new(target.clone(), json!({"n": 1})));

        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        prop_assert_eq!(registry.handler_count(&target), 1);
    }

    #[test]
    fn dispatch_reaches_exactly_type_and_wildcard_handlers(
        types in proptest::collection::btree_set(event_type(), 1..6),
        wildcards in 0usize..3,
        pick in any::<prop::sample::Index>(),
    ) {
        let registry = DispatchRegistry::new();
        let types: Vec<String> = types.into_iter().collect();
        let counters: Vec<Arc<AtomicUsize>> =
            types.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
        for (t, counter) in types.iter().zip(&counters) {
            registry.subscribe(t, counting(counter)).unwrap();
        }
        let wildcard_calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..wildcards {
            registry.subscribe("*", counting_wildcard(&wildcard_calls)).unwrap();
        }

        let chosen = pick.index(types.len());
        let report = registry.dispatch(&EventEnvelope::new(types[chosen].clone(), JsonValue::Null));

        for (i, counter) in counters.iter().enumerate() {
            let expected = usize::from(i == chosen);
            prop_assert_eq!(counter.load(Ordering::SeqCst), expected);
        }
        prop_assert_eq!(wildcard_calls.load(Ordering::SeqCst), wildcards);
        prop_assert_eq!(report.delivered, 1 + wildcards);
        prop_assert_eq!(report.failed, 0);
    }

    #[test]
    fn failing_handlers_do_not_block_siblings(
        target in event_type(),
        failures in 1usize..4,
        successes in 1usize..4,
    ) {
        let registry = DispatchRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..failures {
            registry.subscribe(&target, failing()).unwrap();
        }
        for _ in 0..successes {
            registry.subscribe(&target, counting(&calls)).unwrap();
        }
        registry.subscribe("*", counting_wildcard(&calls)).unwrap();

        let report = registry.dispatch(&EventEnvelope::new(target.clone(), JsonValue::Null));

        prop_assert_eq!(calls.load(Ordering::SeqCst), successes + 1);
        prop_assert_eq!(report.failed, failures);
        prop_assert_eq!(report.delivered, successes + 1);
    }

    #[test]
    fn emptied_keys_disappear(types in proptest::collection::btree_set(event_type(), 1..6)) {
        let registry = DispatchRegistry::new();
        let handlers: Vec<(String, Handler)> = types
            .iter()
            .map(|t| (t.clone(), Handler::payload_fn("h", |_| Ok(()))))
            .collect();
        for (t, h) in &handlers {
            registry.subscribe(t, h.clone()).unwrap();
        }

        let (removed, rest) = handlers.split_at(handlers.len() / 2 + 1);
        for (t, h) in removed {
            registry.unsubscribe(t, h);
        }

        let remaining: BTreeSet<String> = rest.iter().map(|(t, _)| t.clone()).collect();
        let keys: BTreeSet<String> = registry.event_types().into_iter().collect();
        prop_assert_eq!(keys, remaining);
    }

    #[test]
    fn unknown_unsubscribe_is_a_no_op(
        existing in proptest::collection::vec(event_type(), 0..5),
        unknown in event_type(),
    ) {
        let registry = DispatchRegistry::new();
        for t in &existing {
            registry.subscribe(t, Handler::payload_fn("existing", |_| Ok(()))).unwrap();
        }
        let before = registry.event_types();

        registry.unsubscribe(&unknown, &Handler::payload_fn("stranger", |_| Ok(())));

        prop_assert_eq!(registry.event_types(), before);
    }
}
