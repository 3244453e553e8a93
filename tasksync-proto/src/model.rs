//! Core entities: users, task lists and tasks.
//!
//! Field names serialize in camelCase to match the REST surface
//! (`isPublic`, `estimatedMinutes`, `taskList`, ...).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed title length in characters for lists and tasks.
pub const MAX_TITLE_LENGTH: usize = 256;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw numeric identifier.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw numeric identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a registered user.
    UserId
);
numeric_id!(
    /// Identifier of a task list.
    ListId
);
numeric_id!(
    /// Identifier of a task.
    TaskId
);

/// A registered user as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: UserId,
    /// Display name chosen at registration.
    pub username: String,
    /// Login e-mail address.
    pub email: String,
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Actively being worked on.
    InProgress,
    /// Done.
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Error returned when parsing an unknown [`TaskStatus`] string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0} (expected pending, in_progress or completed)")]
pub struct ParseStatusError(String);

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A task belonging to exactly one [`TaskList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Current workflow status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Time estimate in minutes.
    #[serde(default)]
    pub estimated_minutes: u32,
    /// User the task is assigned to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    /// Optional due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// When the task entered [`TaskStatus::Completed`]; `None` otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Parent list.
    pub task_list: ListId,
}

impl Task {
    /// Moves the task to `status`, keeping `completed_at` consistent.
    ///
    /// `completed_at` is stamped with `now` when the task enters
    /// [`TaskStatus::Completed`] from another status, kept as-is when it was
    /// already completed, and cleared when it leaves the completed state.
    pub fn apply_status(&mut self, status: TaskStatus, now: DateTime<Utc>) {
        match (self.status, status) {
            (TaskStatus::Completed, TaskStatus::Completed) => {}
            (_, TaskStatus::Completed) => self.completed_at = Some(now),
            _ => self.completed_at = None,
        }
        self.status = status;
    }

    /// Returns `true` if the task is completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// A named collection of tasks, owned by one user and optionally shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    /// Unique list identifier.
    pub id: ListId,
    /// Short title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Whether the list is publicly visible.
    #[serde(default)]
    pub is_public: bool,
    /// Owning user.
    pub owner: UserId,
    /// Users the list is shared with.
    #[serde(default)]
    pub collaborators: BTreeSet<UserId>,
    /// Tasks in the list (may be left empty by endpoints that do not populate them).
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskList {
    /// Returns `true` if `user` owns this list.
    #[must_use]
    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Returns `true` if `user` is the owner or a collaborator.
    #[must_use]
    pub fn can_access(&self, user: UserId) -> bool {
        self.is_owner(user) || self.collaborators.contains(&user)
    }
}
