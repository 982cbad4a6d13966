//! Task types: the board columns, the task record, and task request bodies.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, TaskId};
use crate::validation::{
    MAX_TASK_DESCRIPTION_LENGTH, MAX_TASK_TITLE_LENGTH, ValidationError, limit_text, require_text,
};

/// Board column a task lives in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// Every column, in board order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    /// Wire and storage spelling of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that is not one of `TODO`, `IN_PROGRESS`, `DONE`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TODO" => Ok(Self::Todo),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A task as stored and returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// Zero-based index within the (project, status) column.
    pub position: u32,
    pub project_id: ProjectId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every column of one project's board, each ordered by ascending position.
///
/// All three columns are always present on the wire, empty or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    #[serde(rename = "TODO", default)]
    pub todo: Vec<Task>,
    #[serde(rename = "IN_PROGRESS", default)]
    pub in_progress: Vec<Task>,
    #[serde(rename = "DONE", default)]
    pub done: Vec<Task>,
}

impl Board {
    /// Tasks of one column.
    #[must_use]
    pub fn column(&self, status: TaskStatus) -> &[Task] {
        match status {
            TaskStatus::Todo => &self.todo,
            TaskStatus::InProgress => &self.in_progress,
            TaskStatus::Done => &self.done,
        }
    }

    /// Mutable tasks of one column.
    pub fn column_mut(&mut self, status: TaskStatus) -> &mut Vec<Task> {
        match status {
            TaskStatus::Todo => &mut self.todo,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Done => &mut self.done,
        }
    }

    /// Builds a board from tasks in any order, sorting each column by position.
    #[must_use]
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut board = Self::default();
        for task in tasks {
            board.column_mut(task.status).push(task);
        }
        for status in TaskStatus::ALL {
            board.column_mut(status).sort_by_key(|t| t.position);
        }
        board
    }

    /// Finds a task anywhere on the board.
    #[must_use]
    pub fn find(&self, id: TaskId) -> Option<&Task> {
        TaskStatus::ALL
            .iter()
            .flat_map(|s| self.column(*s))
            .find(|t| t.id == id)
    }

    /// Total number of tasks across all columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.todo.len() + self.in_progress.len() + self.done.len()
    }

    /// Returns `true` if no column holds a task.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Body of `POST /projects/{id}/tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl CreateTaskRequest {
    /// Checks title and description bounds.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title, MAX_TASK_TITLE_LENGTH)?;
        if let Some(description) = &self.description {
            limit_text("description", description, MAX_TASK_DESCRIPTION_LENGTH)?;
        }
        Ok(())
    }
}

/// Body of `PATCH /tasks/{id}` and `PATCH /tasks/{id}/move`.
///
/// When `status` or `position` is present the request runs the full move
/// algorithm; otherwise only `title` and `description` are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// Requested index in the destination column. Negative values clamp to
    /// zero, values past the end append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl UpdateTaskRequest {
    /// Returns `true` if the request changes status or position.
    #[must_use]
    pub const fn is_move(&self) -> bool {
        self.status.is_some() || self.position.is_some()
    }

    /// The title/description part of the request.
    #[must_use]
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }

    /// Checks title and description bounds.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.fields().validate()
    }
}

/// Title/description edits carried by updates and moves.
///
/// `None` leaves the stored value unchanged. An empty description clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFields {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl TaskFields {
    /// Returns `true` if neither field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }

    /// Checks title and description bounds.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require_text("title", title, MAX_TASK_TITLE_LENGTH)?;
        }
        if let Some(description) = &self.description {
            limit_text("description", description, MAX_TASK_DESCRIPTION_LENGTH)?;
        }
        Ok(())
    }
}
