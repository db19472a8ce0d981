//! Todo lists, roles and list membership.

use serde::{Deserialize, Serialize};

use crate::auth::UserId;

/// Numeric identifier of a todo list. Also the routing key of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(pub i64);

impl std::fmt::Display for ListId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member's role on a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    #[default]
    Viewer,
}

impl Role {
    /// Returns the lowercase wire name (`owner`, `editor`, `viewer`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    /// Whether this role may create, edit or delete tasks.
    #[must_use]
    pub const fn can_edit(self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A todo list as seen by the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: ListId,
    pub title: String,
    /// The caller's role on this list. Absent roles are read as `viewer`.
    #[serde(rename = "user_role", default)]
    pub role: Role,
}

/// Body of `POST /tasks/create-list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateListInput {
    pub title: String,
}

/// Membership delta carried by `user_added` / `user_removed` push messages.
///
/// `user_removed` only carries the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDelta {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Short user profile embedded in [`ListMember`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// One row of `GET /tasks/{list_id}/members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMember {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: UserId,
    pub list_id: ListId,
    pub role: Role,
    #[serde(default)]
    pub user: Option<MemberProfile>,
}

/// Response of `POST /tasks/{list_id}/invite-user`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InviteResponse {
    pub msg: String,
    pub member_id: i64,
    pub role: Role,
}

/// Response of `POST /tasks/{list_id}/remove-user`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoveUserResponse {
    pub msg: String,
    pub user_id: UserId,
    pub list_id: ListId,
}
