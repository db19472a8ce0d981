//! [`TaskStore`]: list and task state backed by a [`TaskApi`].

use std::sync::Arc;

use parking_lot::Mutex;

use todosync_proto::list::CreateListInput;
use todosync_proto::task::{CreateTaskInput, UpdateTaskInput};
use todosync_proto::{ListId, Task, TaskFilter, TaskId, TodoList, UserId};

use super::{StoreError, StoreSnapshot};
use crate::api::TaskApi;

const FIRST_PAGE: u32 = 1;

/// Authoritative client-side cache of lists and tasks.
///
/// Every operation awaits the backend first and then applies the result
/// under a short lock, so readers never observe a half-applied change.
/// The lock is never held across an `.await`.
///
/// Responses can arrive out of order. Each selection and each task
/// collection read takes a sequence number when issued; a response is only
/// applied when nothing newer was issued in the meantime.
pub struct TaskStore<A: TaskApi> {
    api: Arc<A>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    lists: Vec<TodoList>,
    current_list: Option<TodoList>,
    tasks: Vec<Task>,
    filter: TaskFilter,
    /// Filter of the newest collection read issued. Refetches use it so an
    /// unanswered filter switch is not undone.
    requested_filter: TaskFilter,
    /// Filter asked for while a selection was in flight; applied once the
    /// selection lands.
    queued_filter: Option<TaskFilter>,
    error: Option<String>,
    in_flight: u32,
    selection_seq: u64,
    fetch_seq: u64,
    /// Selection whose fetch has not completed yet.
    pending_selection: Option<u64>,
}

impl State {
    fn current_list_id(&self) -> Option<ListId> {
        self.current_list.as_ref().map(|l| l.id)
    }

    /// Invalidate every read in flight. The next collection is the
    /// unfiltered one.
    fn bump(&mut self) -> u64 {
        self.selection_seq += 1;
        self.fetch_seq += 1;
        self.requested_filter = TaskFilter::All;
        self.queued_filter = None;
        self.selection_seq
    }
}

/// What a collection read does while a selection is in flight.
#[derive(Clone, Copy)]
enum WhilePending {
    /// Drop the read; the selection loads a fresh collection.
    Skip,
    /// Remember the filter and apply it after the selection.
    Queue,
}

/// Marks a backend call in flight for `is_loading`. Undone on drop, so a
/// cancelled operation does not leave the store loading forever.
struct InFlight<'a> {
    state: &'a Mutex<State>,
    selection: Option<u64>,
}

impl<'a> InFlight<'a> {
    fn start(state: &'a Mutex<State>) -> Self {
        state.lock().in_flight += 1;
        Self {
            state,
            selection: None,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut s = self.state.lock();
        s.in_flight = s.in_flight.saturating_sub(1);
        if self.selection.is_some() && s.pending_selection == self.selection {
            s.pending_selection = None;
        }
    }
}

impl<A: TaskApi> TaskStore<A> {
    /// Creates an empty store.
    #[must_use]
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: Mutex::new(State::default()),
        }
    }

    /// The backend this store reads from.
    #[must_use]
    pub const fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Consistent copy of the whole state.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        let s = self.state.lock();
        StoreSnapshot {
            lists: s.lists.clone(),
            current_list: s.current_list.clone(),
            tasks: s.tasks.clone(),
            filter: s.filter,
            is_loading: s.in_flight > 0,
            error: s.error.clone(),
        }
    }

    #[must_use]
    pub fn current_list_id(&self) -> Option<ListId> {
        self.state.lock().current_list_id()
    }

    #[must_use]
    pub fn filter(&self) -> TaskFilter {
        self.state.lock().filter
    }

    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn clear_error(&self) {
        self.state.lock().error = None;
    }

    /// Drop all state, e.g. on logout. In-flight responses are discarded.
    pub fn clear(&self) {
        let mut s = self.state.lock();
        s.bump();
        s.lists.clear();
        s.current_list = None;
        s.tasks.clear();
        s.filter = TaskFilter::All;
        s.error = None;
        s.pending_selection = None;
    }

    fn record(&self, err: impl Into<StoreError>) -> StoreError {
        let err = err.into();
        tracing::warn!(err = %err, "store operation failed");
        self.state.lock().error = Some(err.to_string());
        err
    }

    /// Fetch the user's lists. Selects the first list when nothing is
    /// selected yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Api`] if either fetch fails.
    pub async fn load_lists(&self, user_id: UserId) -> Result<(), StoreError> {
        let _loading = InFlight::start(&self.state);
        let page = self
            .api
            .get_lists(user_id, FIRST_PAGE)
            .await
            .map_err(|e| self.record(e))?;
        tracing::debug!(user_id = %user_id, count = page.items.len(), "lists loaded");

        let first = {
            let mut s = self.state.lock();
            s.lists = page.items;
            let idle = s.current_list.is_none() && s.pending_selection.is_none();
            s.lists.first().filter(|_| idle).map(|l| l.id)
        };
        if let Some(list_id) = first {
            tracing::debug!(list_id = %list_id, "auto-selecting first list");
            self.select_list(list_id).await?;
        }
        Ok(())
    }

    /// Make `list_id` the current list: fetch its metadata and open tasks,
    /// then swap `current_list`, `tasks` and `filter = all` in one step.
    ///
    /// If another selection starts before this one finishes, this one's
    /// result is discarded. A filter requested while the selection was in
    /// flight is loaded right after it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Api`] if a fetch fails. A superseded selection
    /// that fails does not touch the shared error.
    pub async fn select_list(&self, list_id: ListId) -> Result<(), StoreError> {
        let mut loading = InFlight::start(&self.state);
        let seq = {
            let mut s = self.state.lock();
            let seq = s.bump();
            s.pending_selection = Some(seq);
            seq
        };
        loading.selection = Some(seq);

        let fetched = async {
            let list = self.api.get_list(list_id).await?;
            let page = self.api.get_tasks(list_id, FIRST_PAGE).await?;
            Ok::<_, crate::api::ApiError>((list, page.items))
        }
        .await;

        let (list, tasks) = match fetched {
            Ok(v) => v,
            Err(e) => {
                let mut s = self.state.lock();
                if s.selection_seq != seq {
                    tracing::debug!(list_id = %list_id, err = %e, "superseded selection failed");
                    return Err(e.into());
                }
                s.requested_filter = s.filter;
                s.queued_filter = None;
                drop(s);
                return Err(self.record(e));
            }
        };

        let queued = {
            let mut s = self.state.lock();
            if s.selection_seq != seq {
                tracing::debug!(list_id = %list_id, "discarding superseded selection");
                return Ok(());
            }
            tracing::debug!(list_id = %list_id, count = tasks.len(), "list selected");
            s.current_list = Some(list);
            s.tasks = tasks;
            s.filter = TaskFilter::All;
            s.pending_selection = None;
            s.queued_filter.take()
        };
        drop(loading);

        match queued {
            Some(filter) if filter != TaskFilter::All => {
                tracing::debug!(list_id = %list_id, filter = %filter, "applying filter requested during selection");
                self.load_tasks(filter).await
            }
            _ => Ok(()),
        }
    }

    /// Refetch the task collection for `filter` and make it the active
    /// filter.
    ///
    /// `all` and `completed` read the current list. `starred` reads starred
    /// tasks across every list the user can see.
    ///
    /// No-op without a current list. While a selection is in flight the
    /// filter is remembered and loaded once the selection lands.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Api`] if the fetch fails.
    pub async fn load_tasks(&self, filter: TaskFilter) -> Result<(), StoreError> {
        self.fetch_tasks(Some(filter), WhilePending::Queue).await
    }

    /// `None` reloads under the newest requested filter.
    async fn fetch_tasks(
        &self,
        filter: Option<TaskFilter>,
        pending: WhilePending,
    ) -> Result<(), StoreError> {
        let (list_id, filter, selection, fetch) = {
            let mut s = self.state.lock();
            let Some(list_id) = s.current_list_id() else {
                return Ok(());
            };
            let filter = filter.unwrap_or(s.requested_filter);
            if s.pending_selection.is_some() {
                match pending {
                    WhilePending::Skip => {
                        tracing::debug!(list_id = %list_id, "selection in flight, skipping task reload");
                    }
                    WhilePending::Queue => {
                        tracing::debug!(list_id = %list_id, filter = %filter, "selection in flight, queueing filter");
                        s.queued_filter = Some(filter);
                        s.requested_filter = filter;
                    }
                }
                return Ok(());
            }
            s.fetch_seq += 1;
            s.requested_filter = filter;
            (list_id, filter, s.selection_seq, s.fetch_seq)
        };

        let _loading = InFlight::start(&self.state);
        let fetched = match filter {
            TaskFilter::All => self.api.get_tasks(list_id, FIRST_PAGE).await,
            TaskFilter::Completed => self.api.get_completed_tasks(list_id, FIRST_PAGE).await,
            TaskFilter::Starred => self.api.get_starred_tasks(FIRST_PAGE).await,
        };

        let mut s = self.state.lock();
        let current = s.selection_seq == selection && s.fetch_seq == fetch;
        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                if current {
                    s.requested_filter = s.filter;
                }
                drop(s);
                return Err(self.record(e));
            }
        };
        if !current {
            tracing::debug!(list_id = %list_id, filter = %filter, "discarding stale task collection");
            return Ok(());
        }
        s.tasks = page.items;
        s.filter = filter;
        Ok(())
    }

    /// Switch the active filter and reload the collection for it.
    ///
    /// # Errors
    ///
    /// See [`TaskStore::load_tasks`].
    pub async fn set_filter(&self, filter: TaskFilter) -> Result<(), StoreError> {
        self.load_tasks(filter).await
    }

    /// Reload the task collection under the newest requested filter, which
    /// may still be in flight. Skipped while a selection is in flight.
    ///
    /// # Errors
    ///
    /// See [`TaskStore::load_tasks`].
    pub async fn refetch(&self) -> Result<(), StoreError> {
        self.fetch_tasks(None, WhilePending::Skip).await
    }

    /// Re-read the current list's metadata (title, role).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Api`] if the fetch fails.
    pub async fn refresh_current_list(&self) -> Result<(), StoreError> {
        let Some(list_id) = self.current_list_id() else {
            return Ok(());
        };
        let list = self
            .api
            .get_list(list_id)
            .await
            .map_err(|e| self.record(e))?;
        self.apply_list(list);
        Ok(())
    }

    fn apply_list(&self, list: TodoList) {
        let mut s = self.state.lock();
        if let Some(entry) = s.lists.iter_mut().find(|l| l.id == list.id) {
            entry.clone_from(&list);
        }
        if s.current_list_id() == Some(list.id) {
            s.current_list = Some(list);
        }
    }

    /// Create a list, append it and select it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Api`] if creating or selecting fails.
    pub async fn create_list(&self, title: &str) -> Result<TodoList, StoreError> {
        let _loading = InFlight::start(&self.state);
        let input = CreateListInput {
            title: title.to_string(),
        };
        let list = self
            .api
            .create_list(&input)
            .await
            .map_err(|e| self.record(e))?;
        tracing::info!(list_id = %list.id, "list created");
        self.state.lock().lists.push(list.clone());
        self.select_list(list.id).await?;
        Ok(list)
    }

    /// Rename a list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Api`] if the update fails.
    pub async fn update_list(&self, list_id: ListId, title: &str) -> Result<(), StoreError> {
        let list = self
            .api
            .update_list(list_id, title)
            .await
            .map_err(|e| self.record(e))?;
        self.apply_list(list);
        Ok(())
    }

    /// Delete a list. When it was the current list, the first remaining list
    /// is selected, or the selection is cleared if none remain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Api`] if the delete or the follow-up selection
    /// fails.
    pub async fn delete_list(&self, list_id: ListId) -> Result<(), StoreError> {
        self.api
            .delete_list(list_id)
            .await
            .map_err(|e| self.record(e))?;
        tracing::info!(list_id = %list_id, "list deleted");

        let next = {
            let mut s = self.state.lock();
            s.lists.retain(|l| l.id != list_id);
            if s.current_list_id() != Some(list_id) {
                return Ok(());
            }
            s.bump();
            s.pending_selection = None;
            s.current_list = None;
            s.tasks.clear();
            s.filter = TaskFilter::All;
            s.lists.first().map(|l| l.id)
        };
        if let Some(next) = next {
            self.select_list(next).await?;
        }
        Ok(())
    }

    fn require_list(&self) -> Result<ListId, StoreError> {
        self.current_list_id().ok_or(StoreError::NoListSelected)
    }

    /// Create a task in the current list and put it at the front.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoListSelected`] without a current list;
    /// [`StoreError::Api`] if the create fails.
    pub async fn create_task(&self, input: &CreateTaskInput) -> Result<Task, StoreError> {
        let list_id = self.require_list()?;
        let task = self
            .api
            .create_task(list_id, input)
            .await
            .map_err(|e| self.record(e))?;
        let mut s = self.state.lock();
        if s.current_list_id() == Some(list_id) {
            s.tasks.insert(0, task.clone());
        }
        Ok(task)
    }

    /// Send `input` for a task of the current list and replace it with the
    /// server's copy.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoListSelected`] without a current list;
    /// [`StoreError::Api`] if the update fails.
    pub async fn update_task(
        &self,
        task_id: TaskId,
        input: &UpdateTaskInput,
    ) -> Result<Task, StoreError> {
        let list_id = self.require_list()?;
        let task = self
            .api
            .update_task(list_id, task_id, input)
            .await
            .map_err(|e| self.record(e))?;
        let mut s = self.state.lock();
        if s.current_list_id() == Some(list_id)
            && let Some(slot) = s.tasks.iter_mut().find(|t| t.id == task_id)
        {
            slot.clone_from(&task);
        }
        Ok(task)
    }

    /// Delete a task of the current list.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoListSelected`] without a current list;
    /// [`StoreError::Api`] if the delete fails.
    pub async fn delete_task(&self, task_id: TaskId) -> Result<(), StoreError> {
        let list_id = self.require_list()?;
        self.api
            .delete_task(list_id, task_id)
            .await
            .map_err(|e| self.record(e))?;
        let mut s = self.state.lock();
        if s.current_list_id() == Some(list_id) {
            s.tasks.retain(|t| t.id != task_id);
        }
        Ok(())
    }

    /// Flip `is_completed`, sending the whole task.
    ///
    /// # Errors
    ///
    /// [`StoreError::TaskNotFound`] if the task is not loaded, otherwise as
    /// [`TaskStore::update_task`].
    pub async fn toggle_complete(&self, task_id: TaskId) -> Result<Task, StoreError> {
        let mut input = self.full_update(task_id)?;
        input.is_completed = input.is_completed.map(|c| !c);
        self.update_task(task_id, &input).await
    }

    /// Flip `is_starred`, sending the whole task.
    ///
    /// # Errors
    ///
    /// [`StoreError::TaskNotFound`] if the task is not loaded, otherwise as
    /// [`TaskStore::update_task`].
    pub async fn toggle_starred(&self, task_id: TaskId) -> Result<Task, StoreError> {
        let mut input = self.full_update(task_id)?;
        input.is_starred = input.is_starred.map(|s| !s);
        self.update_task(task_id, &input).await
    }

    fn full_update(&self, task_id: TaskId) -> Result<UpdateTaskInput, StoreError> {
        let s = self.state.lock();
        if s.current_list.is_none() {
            return Err(StoreError::NoListSelected);
        }
        s.tasks
            .iter()
            .find(|t| t.id == task_id)
            .map(UpdateTaskInput::from_task)
            .ok_or(StoreError::TaskNotFound(task_id))
    }
}
