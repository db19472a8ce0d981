//! Refresh policy and the latest-handler cell.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use todosync_proto::Action;

/// What local state a push message invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Refetch the current list's task collection under the active filter.
    Tasks,
    /// Re-read the current list's metadata.
    ListMeta,
}

impl Refresh {
    /// Map a message kind to the refresh it requires.
    #[must_use]
    pub const fn for_action(action: Action) -> Self {
        match action {
            Action::TaskAdded
            | Action::TaskUpdated
            | Action::TaskDeleted
            | Action::UserAdded
            | Action::UserRemoved => Self::Tasks,
            Action::ListTitleUpdate => Self::ListMeta,
        }
    }
}

/// Async callback that performs a refresh.
pub type RefetchHandler = Arc<dyn Fn(Refresh) -> BoxFuture<'static, ()> + Send + Sync>;

/// Single-slot cell holding the most recently installed handler.
///
/// The long-lived channel subscription reads the cell on every message, so
/// replacing the handler never touches the subscription.
#[derive(Default)]
pub struct LatestHandler {
    slot: RwLock<Option<RefetchHandler>>,
}

impl LatestHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, handler: RefetchHandler) {
        *self.slot.write() = Some(handler);
    }

    #[must_use]
    pub fn get(&self) -> Option<RefetchHandler> {
        self.slot.read().clone()
    }
}

impl std::fmt::Debug for LatestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestHandler")
            .field("installed", &self.slot.read().is_some())
            .finish()
    }
}
