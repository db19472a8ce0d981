//! Synchronization coordinator: turns push messages into store refreshes.
//!
//! A [`SyncCoordinator`] keeps one subscription alive per `(list id, token)`
//! pair. Incoming messages are queued to a single worker task that runs the
//! latest installed [`RefetchHandler`] once per message, in delivery order.
//!
//! ```text
//! push channel ── Subscriber ──▶ mpsc ──▶ worker ──▶ LatestHandler ──▶ TaskStore
//! ```

pub mod handler;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use todosync_proto::{ListId, PushMessage};

use crate::api::TaskApi;
use crate::channel::{PushChannel, Subscriber, Topic};
use crate::store::TaskStore;

pub use handler::{LatestHandler, RefetchHandler, Refresh};

/// The subscription currently held for one `(list id, token)` pair.
struct Session {
    list_id: ListId,
    token: String,
    topic: Topic,
    subscriber: Subscriber,
    active: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

/// Wires a [`PushChannel`] to a refetch handler.
pub struct SyncCoordinator<C: PushChannel> {
    channel: Arc<C>,
    handler: Arc<LatestHandler>,
    session: Mutex<Option<Session>>,
}

impl<C: PushChannel> SyncCoordinator<C> {
    /// Creates a coordinator with no handler installed. Messages that arrive
    /// before [`SyncCoordinator::set_refetch_handler`] are dropped.
    #[must_use]
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            handler: Arc::new(LatestHandler::new()),
            session: Mutex::new(None),
        }
    }

    /// Creates a coordinator that refreshes `store`.
    #[must_use]
    pub fn with_store<A: TaskApi + 'static>(channel: Arc<C>, store: Arc<TaskStore<A>>) -> Self {
        let coordinator = Self::new(channel);
        coordinator.set_refetch_handler(store_handler(store));
        coordinator
    }

    /// The push channel this coordinator drives.
    #[must_use]
    pub const fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Install `handler` for every following message. The subscription is
    /// left untouched.
    pub fn set_refetch_handler(&self, handler: RefetchHandler) {
        self.handler.set(handler);
    }

    /// The list the coordinator is currently attached to.
    #[must_use]
    pub fn attached_list(&self) -> Option<ListId> {
        self.session.lock().as_ref().map(|s| s.list_id)
    }

    /// Follow `list_id` with `token`.
    ///
    /// Same pair as the current session: nothing happens. A different pair
    /// tears the old session down (unsubscribe, then disconnect) before
    /// subscribing anew. Either value missing means [`SyncCoordinator::detach`].
    ///
    /// Must be called inside a tokio runtime.
    pub fn attach(&self, list_id: Option<ListId>, token: Option<&str>) {
        let (Some(list_id), Some(token)) = (list_id, token) else {
            self.detach();
            return;
        };

        let mut session = self.session.lock();
        if session
            .as_ref()
            .is_some_and(|s| s.list_id == list_id && s.token == token)
        {
            return;
        }
        if let Some(old) = session.take() {
            self.teardown(old);
        }

        let topic = Topic::from(list_id);
        let (tx, rx) = mpsc::unbounded_channel::<PushMessage>();
        let active = Arc::new(AtomicBool::new(true));
        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&self.handler),
            Arc::clone(&active),
            list_id,
        ));
        let subscriber = Subscriber::new(move |msg: &PushMessage| {
            if tx.send(msg.clone()).is_err() {
                tracing::debug!(action = %msg.action, "sync worker gone, dropping message");
            }
        });

        tracing::info!(list_id = %list_id, "attaching sync to list");
        self.channel.connect(list_id, token);
        self.channel.subscribe(&topic, subscriber.clone());

        *session = Some(Session {
            list_id,
            token: token.to_string(),
            topic,
            subscriber,
            active,
            worker,
        });
    }

    /// End the session: unsubscribe, then disconnect. Safe to call when
    /// nothing is attached.
    pub fn detach(&self) {
        let old = self.session.lock().take();
        match old {
            Some(old) => self.teardown(old),
            None => self.channel.disconnect(),
        }
    }

    fn teardown(&self, session: Session) {
        tracing::info!(list_id = %session.list_id, "detaching sync from list");
        session.active.store(false, Ordering::SeqCst);
        self.channel.unsubscribe(&session.topic, &session.subscriber);
        self.channel.disconnect();
        // The worker finishes the refresh it is running and then sees the
        // closed queue.
        drop(session.worker);
    }
}

impl<C: PushChannel> Drop for SyncCoordinator<C> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// A handler that refreshes `store`. Failures are already recorded in the
/// store's error state, so they are only logged here.
pub fn store_handler<A: TaskApi + 'static>(store: Arc<TaskStore<A>>) -> RefetchHandler {
    Arc::new(move |refresh| {
        let store = Arc::clone(&store);
        async move {
            let result = match refresh {
                Refresh::Tasks => store.refetch().await,
                Refresh::ListMeta => store.refresh_current_list().await,
            };
            if let Err(e) = result {
                tracing::warn!(refresh = ?refresh, err = %e, "sync refresh failed");
            }
        }
        .boxed()
    })
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<PushMessage>,
    latest: Arc<LatestHandler>,
    active: Arc<AtomicBool>,
    list_id: ListId,
) {
    while let Some(msg) = rx.recv().await {
        if !active.load(Ordering::SeqCst) {
            break;
        }
        let refresh = Refresh::for_action(msg.action);
        let Some(handler) = latest.get() else {
            tracing::debug!(list_id = %list_id, action = %msg.action, "no refetch handler installed");
            continue;
        };
        tracing::debug!(list_id = %list_id, action = %msg.action, refresh = ?refresh, "push message triggers refresh");
        handler(refresh).await;
    }
    tracing::debug!(list_id = %list_id, "sync worker stopped");
}
