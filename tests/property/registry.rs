#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Property tests for the subscription registry: any interleaving of
//! subscribe/unsubscribe calls leaves exactly the set-difference of
//! subscribers, and empty topics disappear.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;

use todosync::channel::{Subscriber, SubscriptionRegistry, Topic};
use todosync_proto::{Action, PushMessage};

const TOPICS: [&str; 3] = ["7", "9", "42"];
const SUBSCRIBERS: usize = 4;

#[derive(Debug, Clone, Copy)]
enum Op {
    Subscribe(usize, usize),
    Unsubscribe(usize, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (any::<bool>(), 0..TOPICS.len(), 0..SUBSCRIBERS).prop_map(|(sub, t, s)| {
        if sub {
            Op::Subscribe(t, s)
        } else {
            Op::Unsubscribe(t, s)
        }
    })
}

fn subscribers() -> (Vec<Subscriber>, Vec<Arc<AtomicUsize>>) {
    (0..SUBSCRIBERS)
        .map(|_| {
            let hits = Arc::new(AtomicUsize::new(0));
            let h = Arc::clone(&hits);
            let sub = Subscriber::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            });
            (sub, hits)
        })
        .unzip()
}

proptest! {
    #[test]
    fn registry_matches_set_model(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let registry = SubscriptionRegistry::new();
        let (subs, hits) = subscribers();
        let mut model: HashMap<usize, HashSet<usize>> = HashMap::new();

        for op in ops {
            match op {
                Op::Subscribe(t, s) => {
                    registry.subscribe(&Topic::new(TOPICS[t]), subs[s].clone());
                    model.entry(t).or_default().insert(s);
                }
                Op::Unsubscribe(t, s) => {
                    registry.unsubscribe(&Topic::new(TOPICS[t]), &subs[s]);
                    if let Some(set) = model.get_mut(&t) {
                        set.remove(&s);
                        if set.is_empty() {
                            model.remove(&t);
                        }
                    }
                }
            }
        }

        prop_assert_eq!(registry.topic_count(), model.len());
        for (t, name) in TOPICS.iter().enumerate() {
            let topic = Topic::new(*name);
            let expected = model.get(&t).cloned().unwrap_or_default();
            prop_assert_eq!(registry.subscriber_count(&topic), expected.len());
            for (s, sub) in subs.iter().enumerate() {
                prop_assert_eq!(registry.contains(&topic, sub), expected.contains(&s));
            }
        }

        // Dispatch to one topic reaches each of its subscribers exactly once
        // and nobody else.
        let target = 2;
        let delivered = registry.dispatch(
            &Topic::new(TOPICS[target]),
            &PushMessage::bare(Action::TaskAdded),
        );
        let expected = model.get(&target).cloned().unwrap_or_default();
        prop_assert_eq!(delivered, expected.len());
        for (s, count) in hits.iter().enumerate() {
            let want = usize::from(expected.contains(&s));
            prop_assert_eq!(count.load(Ordering::SeqCst), want);
        }
    }

    #[test]
    fn unsubscribing_everyone_empties_registry(
        picks in prop::collection::vec((0..TOPICS.len(), 0..SUBSCRIBERS), 1..32)
    ) {
        let registry = SubscriptionRegistry::new();
        let (subs, _hits) = subscribers();
        for &(t, s) in &picks {
            registry.subscribe(&Topic::new(TOPICS[t]), subs[s].clone());
        }
        for &(t, s) in &picks {
            registry.unsubscribe(&Topic::new(TOPICS[t]), &subs[s]);
        }
        prop_assert_eq!(registry.topic_count(), 0);
    }
}
