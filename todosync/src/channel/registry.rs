//! Topic-keyed subscriber sets.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use todosync_proto::{ListId, PushMessage};

/// Routing key for push messages. One topic per list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(String);

impl Topic {
    /// Creates a topic from its string key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Return the string key of this topic.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ListId> for Topic {
    fn from(list_id: ListId) -> Self {
        Self(list_id.to_string())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type Callback = dyn Fn(&PushMessage) + Send + Sync;

/// A registered callback.
///
/// Identity is the allocation behind the `Arc`: clones of one `Subscriber`
/// are the same subscriber, two `Subscriber::new` calls never are.
#[derive(Clone)]
pub struct Subscriber(Arc<Callback>);

impl Subscriber {
    /// Wrap a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&PushMessage) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0).cast::<()>()
    }

    fn call(&self, message: &PushMessage) {
        (self.0)(message);
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(self.addr(), other.addr())
    }
}

impl Eq for Subscriber {}

impl Hash for Subscriber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Subscriber").field(&self.addr()).finish()
    }
}

/// Maps topics to sets of subscribers.
///
/// Adding the same subscriber twice to a topic is a no-op. Removing the last
/// subscriber of a topic removes the topic entry.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: Mutex<HashMap<Topic, HashSet<Subscriber>>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` under `topic`.
    pub fn subscribe(&self, topic: &Topic, subscriber: Subscriber) {
        self.topics
            .lock()
            .entry(topic.clone())
            .or_default()
            .insert(subscriber);
    }

    /// Remove `subscriber` from `topic`. Unknown topics and subscribers are ignored.
    pub fn unsubscribe(&self, topic: &Topic, subscriber: &Subscriber) {
        let mut topics = self.topics.lock();
        if let Some(set) = topics.get_mut(topic) {
            set.remove(subscriber);
            if set.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Invoke every subscriber of `topic` once with `message`.
    ///
    /// Subscribers run outside the registry lock, so a callback may subscribe
    /// or unsubscribe. A panicking callback is logged and the remaining
    /// callbacks still run. Returns the number of callbacks invoked.
    pub fn dispatch(&self, topic: &Topic, message: &PushMessage) -> usize {
        let subscribers: Vec<Subscriber> = match self.topics.lock().get(topic) {
            Some(set) => set.iter().cloned().collect(),
            None => return 0,
        };
        for subscriber in &subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber.call(message))).is_err() {
                tracing::error!(topic = %topic, action = %message.action, "subscriber panicked");
            }
        }
        subscribers.len()
    }

    /// Drop every topic and subscriber.
    pub fn clear(&self) {
        self.topics.lock().clear();
    }

    /// Number of topics with at least one subscriber.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    /// Number of subscribers registered under `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.lock().get(topic).map_or(0, HashSet::len)
    }

    /// Whether `subscriber` is registered under `topic`.
    #[must_use]
    pub fn contains(&self, topic: &Topic, subscriber: &Subscriber) -> bool {
        self.topics
            .lock()
            .get(topic)
            .is_some_and(|set| set.contains(subscriber))
    }
}
