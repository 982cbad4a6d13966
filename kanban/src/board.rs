//! Client-side copy of one project's board.
//!
//! [`LocalBoard`] applies a move speculatively with the same clamp and splice
//! rules the server uses, so a front end can redraw immediately. The server's
//! answer is authoritative: [`LocalBoard::reconcile`] replaces the local
//! columns wholesale and never merges them.

use kanban_proto::ids::{ProjectId, TaskId};
use kanban_proto::ordering::{insertion_index, position_at};
use kanban_proto::task::{Board, Task, TaskStatus, UpdateTaskRequest};

use crate::client::{BoardClient, ClientError};

/// In-memory board for one project.
#[derive(Debug, Clone)]
pub struct LocalBoard {
    project: ProjectId,
    board: Board,
    speculative: bool,
}

impl LocalBoard {
    /// Wraps a board fetched from the server.
    #[must_use]
    pub const fn new(project: ProjectId, board: Board) -> Self {
        Self {
            project,
            board,
            speculative: false,
        }
    }

    /// Fetches the current board of `project`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the board cannot be fetched.
    pub async fn fetch(client: &BoardClient, project: ProjectId) -> Result<Self, ClientError> {
        Ok(Self::new(project, client.list_board(project).await?))
    }

    #[must_use]
    pub const fn project(&self) -> ProjectId {
        self.project
    }

    /// Current columns, speculative or confirmed.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Returns `true` if local edits have not been confirmed by the server.
    #[must_use]
    pub const fn is_speculative(&self) -> bool {
        self.speculative
    }

    /// Moves a task locally, clamping `position` the way the server does.
    ///
    /// Both affected columns are renumbered to `0..n`. Returns `false` and
    /// changes nothing if the task is not on this board.
    pub fn apply_move(
        &mut self,
        task: TaskId,
        status: Option<TaskStatus>,
        position: Option<i64>,
    ) -> bool {
        let Some(source) = self.board.find(task).map(|t| t.status) else {
            return false;
        };
        let destination = status.unwrap_or(source);

        let column = self.board.column_mut(source);
        let Some(index) = column.iter().position(|t| t.id == task) else {
            return false;
        };
        let mut moving = column.remove(index);
        moving.status = destination;

        let column = self.board.column_mut(destination);
        let index = insertion_index(position, column.len());
        column.insert(index, moving);

        renumber(self.board.column_mut(source));
        if destination != source {
            renumber(self.board.column_mut(destination));
        }
        self.speculative = true;
        tracing::debug!(
            task_id = %task,
            from = %source,
            to = %destination,
            index,
            "applied local move"
        );
        true
    }

    /// Removes a task locally and closes the gap.
    pub fn apply_remove(&mut self, task: TaskId) -> bool {
        let Some(status) = self.board.find(task).map(|t| t.status) else {
            return false;
        };
        let column = self.board.column_mut(status);
        column.retain(|t| t.id != task);
        renumber(column);
        self.speculative = true;
        true
    }

    /// Replaces local state with the server's board.
    pub fn reconcile(&mut self, board: Board) {
        self.board = board;
        self.speculative = false;
    }

    /// Moves a task optimistically, sends the move, then reconciles with the
    /// server's board whether the move succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns the move's [`ClientError`] after rolling the local board back
    /// to the server state, or the error of the refresh itself.
    pub async fn sync_move(
        &mut self,
        client: &BoardClient,
        task: TaskId,
        req: &UpdateTaskRequest,
    ) -> Result<Task, ClientError> {
        self.apply_move(task, req.status, req.position);
        let outcome = client.move_task(task, req).await;
        let board = client.list_board(self.project).await?;
        self.reconcile(board);
        outcome
    }

    /// Deletes a task optimistically, then reconciles with the server.
    ///
    /// # Errors
    ///
    /// Same as [`sync_move`](Self::sync_move).
    pub async fn sync_remove(
        &mut self,
        client: &BoardClient,
        task: TaskId,
    ) -> Result<(), ClientError> {
        self.apply_remove(task);
        let outcome = client.delete_task(task).await;
        let board = client.list_board(self.project).await?;
        self.reconcile(board);
        outcome
    }
}

fn renumber(column: &mut [Task]) {
    for (index, task) in column.iter_mut().enumerate() {
        task.position = position_at(index);
    }
}
