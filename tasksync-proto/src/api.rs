//! Request and response bodies for the list and task endpoints.
//!
//! List and task bodies travel inside a [`DataEnvelope`] in both directions,
//! e.g. `POST /task-lists` with `{"data": {"title": "Work", ...}}`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ListId, MAX_TITLE_LENGTH, TaskStatus, UserId};

/// Wrapper around every list/task payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    /// The wrapped payload.
    pub data: T,
}

impl<T> DataEnvelope<T> {
    /// Wraps `data` in an envelope.
    pub const fn new(data: T) -> Self {
        Self { data }
    }

    /// Unwraps the payload.
    pub fn into_inner(self) -> T {
        self.data
    }
}

/// Validation failures for drafts and patches, checked on both sides.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The title is empty or whitespace only.
    #[error("title cannot be empty")]
    TitleEmpty,
    /// The title exceeds [`MAX_TITLE_LENGTH`] characters.
    #[error("title too long (max {} characters)", MAX_TITLE_LENGTH)]
    TitleTooLong,
}

/// Checks a list or task title.
///
/// # Errors
///
/// Returns [`ValidationError`] if the title is blank or too long.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(())
}

/// Body of `POST /task-lists`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListDraft {
    /// List title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Public visibility flag.
    #[serde(default)]
    pub is_public: bool,
}

impl TaskListDraft {
    /// Creates a private list draft with an empty description.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            is_public: false,
        }
    }

    /// Checks the draft before it is sent or stored.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the title is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }
}

/// Collaborator changes carried by a [`TaskListPatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorChange {
    /// Users to add.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub connect: BTreeSet<UserId>,
    /// Users to remove.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disconnect: BTreeSet<UserId>,
}

/// Body of `PUT /task-lists/{id}`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New visibility flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    /// Collaborators to connect or disconnect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaborators: Option<CollaboratorChange>,
}

impl TaskListPatch {
    /// A patch that only adds `user` as a collaborator.
    #[must_use]
    pub fn connect(user: UserId) -> Self {
        Self {
            collaborators: Some(CollaboratorChange {
                connect: BTreeSet::from([user]),
                disconnect: BTreeSet::new(),
            }),
            ..Self::default()
        }
    }

    /// A patch that only removes `user` from the collaborators.
    #[must_use]
    pub fn disconnect(user: UserId) -> Self {
        Self {
            collaborators: Some(CollaboratorChange {
                connect: BTreeSet::new(),
                disconnect: BTreeSet::from([user]),
            }),
            ..Self::default()
        }
    }

    /// Checks the patch before it is sent or applied.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if a new title is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.title.as_deref().map_or(Ok(()), validate_title)
    }
}

/// Body of `POST /tasks`. New tasks always start as [`TaskStatus::Pending`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    /// Parent list.
    pub task_list: ListId,
    /// Task title.
    pub title: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Time estimate in minutes.
    #[serde(default)]
    pub estimated_minutes: u32,
    /// Optional assignee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    /// Optional due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    /// Creates a draft with only the required fields set.
    pub fn new(task_list: ListId, title: impl Into<String>) -> Self {
        Self {
            task_list,
            title: title.into(),
            description: None,
            estimated_minutes: 0,
            assigned_to: None,
            due_date: None,
        }
    }

    /// Checks the draft before it is sent or stored.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the title is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }
}

/// Body of `PUT /tasks/{id}`; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    /// New status; the server maintains `completedAt` from it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New assignee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    /// New due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskPatch {
    /// A patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Checks the patch before it is sent or applied.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if a new title is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.title.as_deref().map_or(Ok(()), validate_title)
    }
}

/// Query string of `GET /tasks`.
///
/// The backend requires at least one of `task_list` or `assigned_to`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQuery {
    /// Restrict to one list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_list: Option<ListId>,
    /// Restrict to one status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Restrict to tasks assigned to one user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
}

impl TaskQuery {
    /// All tasks of one list.
    #[must_use]
    pub fn for_list(list: ListId) -> Self {
        Self {
            task_list: Some(list),
            ..Self::default()
        }
    }

    /// Tasks of one list in one status.
    #[must_use]
    pub fn for_list_with_status(list: ListId, status: TaskStatus) -> Self {
        Self {
            task_list: Some(list),
            status: Some(status),
            assigned_to: None,
        }
    }

    /// Tasks assigned to `user` across every accessible list.
    #[must_use]
    pub fn assigned_to(user: UserId) -> Self {
        Self {
            assigned_to: Some(user),
            ..Self::default()
        }
    }

    /// Renders the query as `(name, value)` pairs for a URL query string.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(list) = self.task_list {
            pairs.push(("taskList", list.to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(user) = self.assigned_to {
            pairs.push(("assignedTo", user.to_string()));
        }
        pairs
    }
}

/// Error payload returned by the backend for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Details inside an [`ErrorBody`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// HTTP status code.
    pub status: u16,
    /// Error class name (e.g. `ForbiddenError`).
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    /// Builds an error body.
    pub fn new(status: u16, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                status,
                name: name.into(),
                message: message.into(),
            },
        }
    }
}
