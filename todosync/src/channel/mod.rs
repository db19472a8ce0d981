//! Push channel: connection lifecycle and topic fan-out.
//!
//! [`manager::ChannelManager`] owns at most one live connection, keyed by
//! `(list id, token)`, reconnects with linear backoff after an unexpected
//! close, and hands every decoded frame to the [`registry::SubscriptionRegistry`]
//! under the connection's topic. Nothing here returns errors to callers:
//! failures are logged and reflected in [`ChannelStatus`].

pub mod dial;
pub mod manager;
pub mod registry;

use std::fmt;
use std::time::Duration;

use todosync_proto::ListId;
use tokio::sync::watch;

pub use dial::{Dialer, Frame, FrameStream, WsDialer};
pub use manager::ChannelManager;
pub use registry::{Subscriber, SubscriptionRegistry, Topic};

/// Lifecycle state of the physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and no retry pending.
    #[default]
    Closed,
    /// A dial is in progress.
    Connecting,
    /// Connected and receiving frames.
    Open,
    /// Waiting out a backoff delay before the next dial.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// Observable connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Set when automatic reconnection gave up. Cleared by the next
    /// successful open or explicit connect.
    pub exhausted: bool,
}

/// Linear reconnect backoff: attempt `n` waits `base_delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` once
    /// `attempt` exceeds `max_attempts`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (1..=self.max_attempts)
            .contains(&attempt)
            .then(|| self.base_delay.saturating_mul(attempt))
    }
}

/// Settings for [`ChannelManager`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Push endpoint base, e.g. `ws://localhost:8000/ws`. The list id is
    /// appended as a path segment and the token as a `token` query parameter.
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
    /// Upper bound on a single dial. A timed-out dial counts as a failed one.
    pub connect_timeout: Duration,
}

impl ChannelConfig {
    /// Creates a `ChannelConfig` with default backoff and timeout.
    #[must_use]
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Endpoint URL for `list_id` authenticated by `token`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidEndpoint`] if `ws_url` does not parse.
    pub fn endpoint(&self, list_id: ListId, token: &str) -> Result<url::Url, ChannelError> {
        let mut url = url::Url::parse(&format!(
            "{}/{list_id}",
            self.ws_url.trim_end_matches('/')
        ))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

/// Errors raised while dialing or reading. They never leave the channel
/// manager; they are logged and drive the reconnect path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The dial did not finish within `connect_timeout`.
    #[error("push channel connect timed out")]
    Timeout,
    /// Nothing is listening at the endpoint.
    #[error("push server unreachable: {0}")]
    Unreachable(String),
    /// The server refused the upgrade (bad token, unknown list).
    #[error("push server rejected the handshake: HTTP {0}")]
    Rejected(u16),
    /// Read or protocol failure on an established connection.
    #[error("push channel transport error: {0}")]
    Transport(String),
    /// The configured endpoint is not a valid URL.
    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Connection and subscription surface used by the sync coordinator.
///
/// None of these calls fail or block; connection progress is reported
/// through [`PushChannel::status`].
pub trait PushChannel: Send + Sync {
    /// Open a connection for `list_id`. No-op while a connection is open or
    /// being dialed.
    fn connect(&self, list_id: ListId, token: &str);

    /// Close the connection and drop every subscription on every topic.
    fn disconnect(&self);

    /// Register `subscriber` for messages on `topic`.
    fn subscribe(&self, topic: &Topic, subscriber: Subscriber);

    /// Remove `subscriber` from `topic`.
    fn unsubscribe(&self, topic: &Topic, subscriber: &Subscriber);

    /// Current connection status.
    fn status(&self) -> ChannelStatus;

    /// Receiver that observes every status change.
    fn watch_status(&self) -> watch::Receiver<ChannelStatus>;
}
