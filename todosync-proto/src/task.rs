//! Tasks, task filters and the paginated collection envelope.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::list::ListId;

/// Numeric identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A task on a todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub list_id: ListId,
    #[serde(rename = "task_title")]
    pub title: String,
    #[serde(rename = "task_details", default)]
    pub details: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(rename = "is_completed", default)]
    pub completed: bool,
    #[serde(rename = "is_starred", default)]
    pub starred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

/// Which slice of tasks the client is looking at.
///
/// `All` and `Completed` are scoped to the current list. `Starred` is global:
/// it returns starred tasks from every list the user can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskFilter {
    #[default]
    All,
    Completed,
    Starred,
}

impl TaskFilter {
    /// Whether results for this filter are restricted to a single list.
    #[must_use]
    pub const fn is_list_scoped(self) -> bool {
        !matches!(self, Self::Starred)
    }
}

impl std::fmt::Display for TaskFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Completed => write!(f, "completed"),
            Self::Starred => write!(f, "starred"),
        }
    }
}

/// Error returned when parsing an unknown filter name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task filter: {0}")]
pub struct UnknownFilter(pub String);

impl std::str::FromStr for TaskFilter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "completed" => Ok(Self::Completed),
            "starred" => Ok(Self::Starred),
            other => Err(UnknownFilter(other.to_string())),
        }
    }
}

/// Body of `POST /tasks/{list_id}/add-task`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateTaskInput {
    pub task_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
}

impl CreateTaskInput {
    /// A task with only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            task_title: title.into(),
            ..Self::default()
        }
    }
}

/// Body of `PUT /tasks/{list_id}/{task_id}/update-task`.
///
/// Unset fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateTaskInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
}

impl UpdateTaskInput {
    /// Every writable field of `task`, for whole-object updates.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_title: Some(task.title.clone()),
            task_details: task.details.clone(),
            due_date: task.due_date,
            start_time: task.start_time,
            is_completed: Some(task.completed),
            is_starred: Some(task.starred),
        }
    }
}

/// Paginated collection returned by the list and task endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(rename = "itemsPerPage", default)]
    pub items_per_page: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total: u64,
}
