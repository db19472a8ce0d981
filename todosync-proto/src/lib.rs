//! Shared wire definitions for the `TodoSync` REST API and push channel.

pub mod auth;
pub mod codec;
pub mod list;
pub mod message;
pub mod task;

pub use auth::UserId;
pub use list::{ListId, Role, TodoList};
pub use message::{Action, PushMessage};
pub use task::{Task, TaskFilter, TaskId};
