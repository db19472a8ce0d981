//! REST API client for the todo-list backend.
//!
//! The backend is an external collaborator. [`TaskApi`] is the seam the
//! [`crate::store::TaskStore`] talks through, so the store can be driven by an
//! in-memory fake in tests. [`http::HttpTaskApi`] is the real implementation.

pub mod http;

use std::future::Future;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use todosync_proto::UserId;
use todosync_proto::list::{CreateListInput, ListId, TodoList};
use todosync_proto::task::{CreateTaskInput, Page, Task, TaskId, UpdateTaskInput};

pub use http::{ApiConfig, HttpTaskApi};

/// Message used when an error response carries no readable body.
pub const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";

/// Errors returned by REST calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    ///
    /// `message` is the server's `detail` or `message` field when present.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Human-readable message.
        message: String,
    },

    /// The request never produced a response (DNS, connect, TLS, body read).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A 2xx response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// A bearer token could not be decoded.
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl ApiError {
    /// Build a [`ApiError::Status`] from a failed response body.
    ///
    /// Reads `detail` (string, or object with a `message`) then `message`.
    /// A body that is not JSON yields [`FALLBACK_ERROR_MESSAGE`]; a JSON body
    /// with neither field yields `HTTP <status>`.
    #[must_use]
    pub fn from_error_body(status: u16, body: &str) -> Self {
        let message = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(value) => extract_message(&value).unwrap_or_else(|| format!("HTTP {status}")),
            Err(_) => FALLBACK_ERROR_MESSAGE.to_string(),
        };
        Self::Status { status, message }
    }

    /// HTTP status code, when the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn extract_message(value: &serde_json::Value) -> Option<String> {
    let from_field = |field: &serde_json::Value| match field {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    value
        .get("detail")
        .and_then(from_field)
        .or_else(|| value.get("message").and_then(from_field))
}

/// Backend calls the local store depends on.
///
/// Every method maps one-to-one onto a REST endpoint. Implementations must
/// return `Send` futures so the store can be driven from spawned tasks.
pub trait TaskApi: Send + Sync {
    /// `GET /tasks/{user_id}/todolists`
    fn get_lists(
        &self,
        user_id: UserId,
        page: u32,
    ) -> impl Future<Output = Result<Page<TodoList>, ApiError>> + Send;

    /// `GET /tasks/{list_id}`
    fn get_list(&self, list_id: ListId)
    -> impl Future<Output = Result<TodoList, ApiError>> + Send;

    /// `POST /tasks/create-list`
    fn create_list(
        &self,
        input: &CreateListInput,
    ) -> impl Future<Output = Result<TodoList, ApiError>> + Send;

    /// `PUT /tasks/{list_id}/update-list`
    fn update_list(
        &self,
        list_id: ListId,
        title: &str,
    ) -> impl Future<Output = Result<TodoList, ApiError>> + Send;

    /// `DELETE /tasks/{list_id}/delete-list`
    fn delete_list(&self, list_id: ListId) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `GET /tasks/{list_id}/tasks` (open tasks of one list)
    fn get_tasks(
        &self,
        list_id: ListId,
        page: u32,
    ) -> impl Future<Output = Result<Page<Task>, ApiError>> + Send;

    /// `GET /tasks/{list_id}/tasks-completed`
    fn get_completed_tasks(
        &self,
        list_id: ListId,
        page: u32,
    ) -> impl Future<Output = Result<Page<Task>, ApiError>> + Send;

    /// `GET /tasks/starred-tasks` (every list the caller can see)
    fn get_starred_tasks(
        &self,
        page: u32,
    ) -> impl Future<Output = Result<Page<Task>, ApiError>> + Send;

    /// `POST /tasks/{list_id}/add-task`
    fn create_task(
        &self,
        list_id: ListId,
        input: &CreateTaskInput,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// `PUT /tasks/{list_id}/{task_id}/update-task`
    fn update_task(
        &self,
        list_id: ListId,
        task_id: TaskId,
        input: &UpdateTaskInput,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// `DELETE /tasks/{list_id}/{task_id}/delete-task`
    fn delete_task(
        &self,
        list_id: ListId,
        task_id: TaskId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Read the user id from a bearer token's `sub` claim.
///
/// Only the payload segment is decoded. The signature is not checked; the
/// server does that on every request.
///
/// # Errors
///
/// Returns [`ApiError::InvalidToken`] if the token is not a three-part JWT,
/// the payload is not base64url JSON, or `sub` is missing or non-numeric.
pub fn user_id_from_token(token: &str) -> Result<UserId, ApiError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| ApiError::InvalidToken("expected three dot-separated segments".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ApiError::InvalidToken(format!("payload is not base64url: {e}")))?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::InvalidToken(format!("payload is not JSON: {e}")))?;
    let sub = claims
        .get("sub")
        .ok_or_else(|| ApiError::InvalidToken("missing sub claim".into()))?;
    let id = match sub {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ApiError::InvalidToken(format!("sub is not a user id: {sub}")))?;
    Ok(UserId(id))
}
