//! Connection lifecycle for the push channel.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use todosync_proto::{ListId, codec};

use super::dial::{Dialer, Frame, FrameStream, WsDialer};
use super::registry::{Subscriber, SubscriptionRegistry, Topic};
use super::{ChannelConfig, ChannelError, ChannelStatus, ConnectionState, PushChannel};

/// Owns the single push connection of a session.
///
/// One background supervisor task per connection dials, reads, and on an
/// unexpected close waits out the backoff delay before dialing again.
/// Every decoded frame is dispatched to the connection's list topic.
///
/// Requires a running tokio runtime: [`PushChannel::connect`] spawns.
pub struct ChannelManager<D: Dialer = WsDialer> {
    inner: Arc<Inner<D>>,
}

struct Inner<D> {
    dialer: D,
    config: ChannelConfig,
    registry: SubscriptionRegistry,
    slot: Mutex<Slot>,
    status_tx: watch::Sender<ChannelStatus>,
}

/// Mutable connection bookkeeping.
///
/// `generation` is bumped whenever a supervisor is started or torn down, so
/// a superseded supervisor notices it is stale and stops touching state.
#[derive(Default)]
struct Slot {
    status: ChannelStatus,
    generation: u64,
    list_id: Option<ListId>,
    supervisor: Option<JoinHandle<()>>,
}

impl ChannelManager<WsDialer> {
    /// Creates a WebSocket-backed manager.
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_dialer(config, WsDialer)
    }
}

impl<D: Dialer> ChannelManager<D> {
    /// Creates a manager that opens connections through `dialer`.
    pub fn with_dialer(config: ChannelConfig, dialer: D) -> Self {
        let (status_tx, _) = watch::channel(ChannelStatus::default());
        Self {
            inner: Arc::new(Inner {
                dialer,
                config,
                registry: SubscriptionRegistry::new(),
                slot: Mutex::new(Slot::default()),
                status_tx,
            }),
        }
    }

    /// The subscription registry messages are dispatched through.
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Whether the connection is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status().state == ConnectionState::Open
    }

    /// The list the current (or last) connection was opened for.
    #[must_use]
    pub fn list_id(&self) -> Option<ListId> {
        self.inner.slot.lock().list_id
    }
}

impl<D: Dialer> PushChannel for ChannelManager<D> {
    fn connect(&self, list_id: ListId, token: &str) {
        let url = match self.inner.config.endpoint(list_id, token) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(list_id = %list_id, err = %e, "cannot build push endpoint");
                return;
            }
        };

        let mut slot = self.inner.slot.lock();
        match slot.status.state {
            ConnectionState::Open | ConnectionState::Connecting => {
                if slot.list_id != Some(list_id) {
                    tracing::warn!(
                        list_id = %list_id,
                        current = ?slot.list_id,
                        "push channel busy with another list, ignoring connect"
                    );
                } else {
                    tracing::debug!(list_id = %list_id, "push channel already connected");
                }
                return;
            }
            ConnectionState::Reconnecting => {
                // Explicit connect preempts the pending backoff.
                if let Some(handle) = slot.supervisor.take() {
                    handle.abort();
                }
            }
            ConnectionState::Closed => {}
        }

        slot.generation += 1;
        slot.list_id = Some(list_id);
        slot.status = ChannelStatus {
            state: ConnectionState::Connecting,
            reconnect_attempts: 0,
            exhausted: false,
        };
        self.inner.status_tx.send_replace(slot.status);

        tracing::info!(list_id = %list_id, "connecting push channel");
        let generation = slot.generation;
        let inner = Arc::clone(&self.inner);
        slot.supervisor = Some(tokio::spawn(supervise(inner, generation, list_id, url)));
    }

    fn disconnect(&self) {
        {
            let mut slot = self.inner.slot.lock();
            slot.generation += 1;
            if let Some(handle) = slot.supervisor.take() {
                handle.abort();
            }
            if slot.status.state != ConnectionState::Closed {
                tracing::info!(list_id = ?slot.list_id, "push channel disconnected");
            }
            slot.status = ChannelStatus::default();
            self.inner.status_tx.send_replace(slot.status);
        }
        self.inner.registry.clear();
    }

    fn subscribe(&self, topic: &Topic, subscriber: Subscriber) {
        self.inner.registry.subscribe(topic, subscriber);
    }

    fn unsubscribe(&self, topic: &Topic, subscriber: &Subscriber) {
        self.inner.registry.unsubscribe(topic, subscriber);
    }

    fn status(&self) -> ChannelStatus {
        self.inner.slot.lock().status
    }

    fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.inner.status_tx.subscribe()
    }
}

impl<D: Dialer> Drop for ChannelManager<D> {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.slot.lock().supervisor.take() {
            handle.abort();
        }
    }
}

impl<D: Dialer> Inner<D> {
    fn is_current(&self, generation: u64) -> bool {
        self.slot.lock().generation == generation
    }

    fn set_connecting(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            return false;
        }
        slot.status.state = ConnectionState::Connecting;
        self.status_tx.send_replace(slot.status);
        true
    }

    fn mark_open(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            return false;
        }
        slot.status = ChannelStatus {
            state: ConnectionState::Open,
            reconnect_attempts: 0,
            exhausted: false,
        };
        self.status_tx.send_replace(slot.status);
        true
    }

    /// Record a lost or failed connection and return the backoff delay before
    /// the next dial, or `None` when this supervisor should stop.
    fn schedule_retry(&self, generation: u64, list_id: ListId) -> Option<Duration> {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            return None;
        }
        let attempt = slot.status.reconnect_attempts + 1;
        if let Some(delay) = self.config.reconnect.delay_for(attempt) {
            slot.status.state = ConnectionState::Reconnecting;
            slot.status.reconnect_attempts = attempt;
            tracing::info!(
                list_id = %list_id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling push channel reconnect"
            );
            self.status_tx.send_replace(slot.status);
            Some(delay)
        } else {
            slot.status.state = ConnectionState::Closed;
            slot.status.exhausted = true;
            slot.supervisor = None;
            tracing::warn!(
                list_id = %list_id,
                attempts = slot.status.reconnect_attempts,
                "push channel reconnect attempts exhausted, giving up"
            );
            self.status_tx.send_replace(slot.status);
            None
        }
    }
}

/// Connection supervisor: dial, read until close, back off, repeat.
async fn supervise<D: Dialer>(inner: Arc<Inner<D>>, generation: u64, list_id: ListId, url: Url) {
    let topic = Topic::from(list_id);
    loop {
        if !inner.set_connecting(generation) {
            return;
        }
        let dialed = tokio::time::timeout(inner.config.connect_timeout, inner.dialer.dial(&url))
            .await
            .unwrap_or(Err(ChannelError::Timeout));

        match dialed {
            Ok(frames) => {
                if !inner.mark_open(generation) {
                    return;
                }
                tracing::info!(list_id = %list_id, "push channel connected");
                read_frames(&inner, generation, &topic, frames).await;
                tracing::info!(list_id = %list_id, "push channel closed");
            }
            Err(e) => {
                tracing::warn!(list_id = %list_id, err = %e, "push channel connect failed");
            }
        }

        let Some(delay) = inner.schedule_retry(generation, list_id) else {
            return;
        };
        tokio::time::sleep(delay).await;
    }
}

/// Decode and dispatch frames until the stream ends or errors.
///
/// Malformed frames are logged and skipped; they do not close the connection.
async fn read_frames<D: Dialer>(
    inner: &Inner<D>,
    generation: u64,
    topic: &Topic,
    mut frames: FrameStream,
) {
    while let Some(item) = frames.next().await {
        let decoded = match item {
            Ok(Frame::Text(text)) => codec::decode(&text),
            Ok(Frame::Binary(data)) => codec::decode_bytes(&data),
            Err(e) => {
                tracing::warn!(topic = %topic, err = %e, "push channel read error");
                return;
            }
        };
        match decoded {
            Ok(message) => {
                if !inner.is_current(generation) {
                    return;
                }
                tracing::debug!(topic = %topic, action = %message.action, "push message received");
                inner.registry.dispatch(topic, &message);
            }
            Err(e) => {
                tracing::warn!(topic = %topic, err = %e, "malformed push frame, skipping");
            }
        }
    }
}
