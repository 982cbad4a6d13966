//! Board ordering engine.
//!
//! Every task lives in one `(project, status)` column and its `position` is
//! its index there. Each operation runs inside a single write scope of the
//! store, so after any commit every column of the board holds exactly the
//! positions `0..n`. Callers never see a half-applied move.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kanban_proto::ids::{ProjectId, TaskId, UserId};
use kanban_proto::ordering::splice;
use kanban_proto::task::{
    Board, CreateTaskRequest, Task, TaskFields, TaskStatus, UpdateTaskRequest,
};

use crate::auth::IdentityProvider;
use crate::error::BoardError;
use crate::store::{self, SqliteStore, StoreError, StoreTx};

/// Owns the column ordering rules for every board in the store.
pub struct BoardEngine {
    store: Arc<SqliteStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl BoardEngine {
    /// Creates an engine over `store`, authenticating through `identity`.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Maps a bearer credential to the acting user.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Unauthenticated`] if the credential is unknown
    /// or expired.
    pub fn resolve_caller(&self, credential: &str) -> Result<UserId, BoardError> {
        self.identity.resolve_caller(credential)
    }

    /// Creates a task at the end of its column.
    ///
    /// The column defaults to `TODO`. The new task's position is the column
    /// length observed inside the write scope, so two concurrent appends
    /// never share a slot.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for bad input and
    /// [`BoardError::NotFound`] if `caller` does not own `project`.
    pub fn append_task(
        &self,
        caller: UserId,
        project: ProjectId,
        req: CreateTaskRequest,
    ) -> Result<Task, BoardError> {
        req.validate()?;
        let status = req.status.unwrap_or_default();

        let task = self.store.write(|tx| {
            require_project(tx, caller, project)?;
            let at = store::now();
            let task = Task {
                id: TaskId::new(),
                title: req.title,
                description: req.description.filter(|d| !d.is_empty()),
                status,
                position: tx.count_column(project, status)?,
                project_id: project,
                created_at: at,
                updated_at: at,
            };
            tx.create_task(&task)?;
            Ok::<_, BoardError>(task)
        })?;

        tracing::info!(
            task_id = %task.id,
            project_id = %project,
            status = %task.status,
            position = task.position,
            "task appended"
        );
        Ok(task)
    }

    /// Moves a task to `req.status` (or its current column) at
    /// `req.position` (or the end), applying any title/description edits in
    /// the same scope.
    ///
    /// The destination column is rebuilt without the moving task, the task
    /// is spliced in at the clamped index, and the whole column is renumbered.
    /// When the column changes, the source column is renumbered too.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if the task does not exist or is not
    /// owned by `caller`, [`BoardError::Validation`] for bad field edits, and
    /// [`BoardError::Transaction`] if the store aborted the scope. On any
    /// error no row has changed.
    pub fn move_task(
        &self,
        caller: UserId,
        id: TaskId,
        req: &UpdateTaskRequest,
    ) -> Result<Task, BoardError> {
        req.validate()?;
        let fields = req.fields();

        let (moved, source) = self.store.write(|tx| {
            let mut task = require_task(tx, caller, id)?;
            let source = task.status;
            let destination = req.status.unwrap_or(source);

            let column: Vec<TaskId> = tx
                .find_tasks_by_column(task.project_id, destination, Some(id))?
                .into_iter()
                .map(|t| t.id)
                .collect();
            let order = splice(column, id, req.position);

            let at = store::now();
            task.status = destination;
            apply_fields(&mut task, fields);
            task.updated_at = at;
            if !tx.update_task_fields(&task)? {
                return Err(BoardError::NotFound("Task"));
            }
            tx.update_task_position_batch(&order, at)?;
            if destination != source {
                reindex_column(tx, task.project_id, source, at)?;
            }

            let moved = tx.find_task(id)?.ok_or(BoardError::NotFound("Task"))?;
            Ok::<_, BoardError>((moved, source))
        })?;

        tracing::info!(
            task_id = %id,
            from = %source,
            to = %moved.status,
            position = moved.position,
            "task moved"
        );
        Ok(moved)
    }

    /// Applies a partial update.
    ///
    /// A request carrying `status` or `position` is a move and follows
    /// [`move_task`](Self::move_task). Otherwise only title and description
    /// are written and positions are left alone.
    ///
    /// # Errors
    ///
    /// Same as [`move_task`](Self::move_task).
    pub fn update_task(
        &self,
        caller: UserId,
        id: TaskId,
        req: &UpdateTaskRequest,
    ) -> Result<Task, BoardError> {
        if req.is_move() {
            return self.move_task(caller, id, req);
        }
        req.validate()?;
        let fields = req.fields();

        self.store.write(|tx| {
            let mut task = require_task(tx, caller, id)?;
            if fields.is_empty() {
                return Ok(task);
            }
            apply_fields(&mut task, fields);
            task.updated_at = store::now();
            tx.update_task_fields(&task)?;
            tracing::debug!(task_id = %id, "task fields updated");
            Ok(task)
        })
    }

    /// Deletes a task and closes the gap it leaves in its column.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if the task does not exist or is not
    /// owned by `caller`.
    pub fn remove_task(&self, caller: UserId, id: TaskId) -> Result<(), BoardError> {
        let task = self.store.write(|tx| {
            let task = require_task(tx, caller, id)?;
            tx.delete_task(id)?;
            reindex_column(tx, task.project_id, task.status, store::now())?;
            Ok::<_, BoardError>(task)
        })?;

        tracing::info!(
            task_id = %id,
            project_id = %task.project_id,
            status = %task.status,
            "task removed"
        );
        Ok(())
    }

    /// Returns every column of a project's board, each sorted by position.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if `caller` does not own `project`.
    pub fn list_board(&self, caller: UserId, project: ProjectId) -> Result<Board, BoardError> {
        self.store.read(|tx| {
            require_project(tx, caller, project)?;
            Ok(Board::from_tasks(tx.find_tasks_by_project(project)?))
        })
    }
}

/// Renumbers a column to `0..n` in its current order.
///
/// Returns the number of rows whose position changed.
///
/// # Errors
///
/// Returns [`StoreError`] if a query or update fails.
pub fn reindex_column(
    tx: &StoreTx<'_>,
    project: ProjectId,
    status: TaskStatus,
    at: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let order: Vec<TaskId> = tx
        .find_tasks_by_column(project, status, None)?
        .into_iter()
        .map(|t| t.id)
        .collect();
    let changed = tx.update_task_position_batch(&order, at)?;
    if changed > 0 {
        tracing::debug!(
            project_id = %project,
            %status,
            len = order.len(),
            changed,
            "column reindexed"
        );
    }
    Ok(changed)
}

fn require_project(tx: &StoreTx<'_>, caller: UserId, project: ProjectId) -> Result<(), BoardError> {
    tx.find_project_owned_by(caller, project)?
        .map(|_| ())
        .ok_or(BoardError::NotFound("Project"))
}

fn require_task(tx: &StoreTx<'_>, caller: UserId, id: TaskId) -> Result<Task, BoardError> {
    tx.find_task_owned_by(caller, id)?
        .ok_or(BoardError::NotFound("Task"))
}

fn apply_fields(task: &mut Task, fields: TaskFields) {
    if let Some(title) = fields.title {
        task.title = title;
    }
    if let Some(description) = fields.description {
        task.description = (!description.is_empty()).then_some(description);
    }
}
