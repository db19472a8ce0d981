//! Push-channel envelope.
//!
//! Every frame on the push channel is a JSON object with an `action` tag and
//! an optional payload describing the changed entity. The channel carries no
//! sequence numbers: frames arrive in transport order and nothing detects gaps.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::list::{MemberDelta, TodoList};
use crate::task::Task;

/// Kind of change announced by a push message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TaskAdded,
    TaskUpdated,
    TaskDeleted,
    ListTitleUpdate,
    UserAdded,
    UserRemoved,
}

impl Action {
    /// Every action kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::TaskAdded,
        Self::TaskUpdated,
        Self::TaskDeleted,
        Self::ListTitleUpdate,
        Self::UserAdded,
        Self::UserRemoved,
    ];

    /// Returns the wire name of this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskAdded => "task_added",
            Self::TaskUpdated => "task_updated",
            Self::TaskDeleted => "task_deleted",
            Self::ListTitleUpdate => "list_title_update",
            Self::UserAdded => "user_added",
            Self::UserRemoved => "user_removed",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound push frame.
///
/// The payload fields are informational. Clients treat a message as a
/// trigger to re-read state over REST, not as a source of data. Only
/// `action` decides whether a frame is accepted: a payload that does not
/// match its type decodes as `None`. The backend sends delete notices as
/// `{"task":{"id":N}}` and title updates under the `task` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub action: Action,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub task: Option<Task>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub list: Option<TodoList>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub member: Option<MemberDelta>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

impl PushMessage {
    /// A message with no payload.
    #[must_use]
    pub const fn bare(action: Action) -> Self {
        Self {
            action,
            task: None,
            list: None,
            member: None,
        }
    }
}
