//! Local state store: the in-memory cache the UI renders from.
//!
//! Holds the user's lists, the selected list, that list's task collection and
//! the active filter. Both direct user actions and the sync coordinator go
//! through [`TaskStore`].

pub mod task_store;

pub use task_store::TaskStore;

use thiserror::Error;
use todosync_proto::{Task, TaskFilter, TaskId, TodoList};

use crate::api::ApiError;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend call failed. Its message is also recorded in the store's
    /// shared error state.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The operation needs a selected list.
    #[error("no list selected")]
    NoListSelected,
    /// The task is not in the current task collection.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
}

/// Consistent copy of the whole store state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub lists: Vec<TodoList>,
    pub current_list: Option<TodoList>,
    /// Always belongs to `current_list`, except under the starred filter
    /// which spans every list.
    pub tasks: Vec<Task>,
    pub filter: TaskFilter,
    pub is_loading: bool,
    pub error: Option<String>,
}
