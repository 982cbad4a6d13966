//! SQLite persistence for users, sessions, projects, and tasks.
//!
//! [`SqliteStore`] owns one connection. All access goes through a transaction
//! scope: [`SqliteStore::write`] opens a `BEGIN IMMEDIATE` transaction, which
//! takes the database write lock before the first read, and hands the caller a
//! [`StoreTx`]. The transaction commits when the callback returns `Ok` and
//! rolls back when it returns `Err` or unwinds. Several stores (or several
//! processes) may open the same database file; their write scopes serialize
//! on the SQLite lock, bounded by the configured busy timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use kanban_proto::ids::{ProjectId, TaskId, UserId};
use kanban_proto::ordering::position_at;
use kanban_proto::project::Project;
use kanban_proto::task::{Task, TaskStatus};
use kanban_proto::user::User;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};
use uuid::Uuid;

/// Default time a writer waits for the database lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    name          TEXT,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS projects_owner ON projects(owner_id, created_at);

CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    description TEXT,
    status      TEXT NOT NULL CHECK (status IN ('TODO', 'IN_PROGRESS', 'DONE')),
    position    INTEGER NOT NULL CHECK (position >= 0),
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS tasks_column ON tasks(project_id, status, position);
";

const TASK_COLUMNS: &str =
    "t.id, t.project_id, t.title, t.description, t.status, t.position, t.created_at, t.updated_at";

const PROJECT_COLUMNS: &str = "id, name, description, owner_id, created_at, updated_at";

/// Errors raised by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database lock could not be acquired within the busy timeout.
    #[error("database is busy: {0}")]
    Busy(#[source] rusqlite::Error),

    /// Any other SQLite failure, including constraint violations.
    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// The parent directory of the database file could not be created.
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        /// Directory that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl StoreError {
    /// Returns `true` for failures caused by lock contention.
    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::Busy(err),
            _ => Self::Sqlite(err),
        }
    }
}

/// Current time truncated to the millisecond precision the store keeps.
#[must_use]
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// A user row including the credential secret.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

/// Handle to the SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path` and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the directory cannot be created or SQLite
    /// fails to open or migrate the file.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "database opened");
        Self::init(conn)
    }

    /// Opens a private in-memory database. Used by tests and `--database :memory:`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if SQLite fails to create the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` inside a write transaction holding the database write lock.
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise.
    ///
    /// # Errors
    ///
    /// Returns the callback's error, or a [`StoreError`] (converted into `E`)
    /// if the transaction cannot begin or commit.
    pub fn write<T, E>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.scoped(TransactionBehavior::Immediate, f)
    }

    /// Runs `f` inside a read transaction with a consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns the callback's error, or a [`StoreError`] converted into `E`.
    pub fn read<T, E>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.scoped(TransactionBehavior::Deferred, f)
    }

    fn scoped<T, E>(
        &self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&StoreTx<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(behavior)
            .map_err(StoreError::from)?;
        let scope = StoreTx { tx };
        let value = f(&scope)?;
        scope.tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

/// An open transaction. Every query and write of the store goes through one.
pub struct StoreTx<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl StoreTx<'_> {
    // -----------------------------------------------------------------------
    // Users and sessions
    // -----------------------------------------------------------------------

    /// Inserts a new user row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on constraint violation (duplicate email).
    pub fn insert_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let user = &record.user;
        self.tx.execute(
            "INSERT INTO users (id, email, password_hash, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.email,
                record.password_hash,
                user.name,
                user.created_at.timestamp_millis(),
                user.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Looks a user up by (already normalized) email.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id, email, name, created_at, updated_at, password_hash
                 FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(UserRecord {
                        user: user_from_row(row)?,
                        password_hash: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    /// Looks a user up by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id, email, name, created_at, updated_at FROM users WHERE id = ?1",
                params![id.to_string()],
                user_from_row,
            )
            .optional()?)
    }

    /// Stores a session keyed by the digest of its bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    pub fn insert_session(
        &self,
        token_hash: &str,
        user_id: UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                token_hash,
                user_id.to_string(),
                created_at.timestamp_millis(),
                expires_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Returns the user of an unexpired session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn find_session_user(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<UserId>, StoreError> {
        Ok(self
            .tx
            .query_row(
                "SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
                params![token_hash, at.timestamp_millis()],
                |row| uuid_column(row, 0).map(UserId::from_uuid),
            )
            .optional()?)
    }

    /// Deletes every session that expired at or before `at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    pub fn purge_expired_sessions(&self, at: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.tx.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![at.timestamp_millis()],
        )?)
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Inserts a new project row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    pub fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO projects (id, name, description, owner_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project.id.to_string(),
                project.name,
                project.description,
                project.owner_id.to_string(),
                project.created_at.timestamp_millis(),
                project.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Returns the project if it exists and `user` owns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn find_project_owned_by(
        &self,
        user: UserId,
        id: ProjectId,
    ) -> Result<Option<Project>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1 AND owner_id = ?2"),
                params![id.to_string(), user.to_string()],
                project_from_row,
            )
            .optional()?)
    }

    /// Lists the projects of `user`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn list_projects(&self, user: UserId) -> Result<Vec<Project>, StoreError> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![user.to_string()], project_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Writes name, description, and `updated_at` of an existing project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    pub fn update_project(&self, project: &Project) -> Result<(), StoreError> {
        self.tx.execute(
            "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                project.name,
                project.description,
                project.updated_at.timestamp_millis(),
                project.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Deletes a project; its tasks go with it through the foreign key cascade.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    pub fn delete_project(&self, id: ProjectId) -> Result<bool, StoreError> {
        let deleted = self
            .tx
            .execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Returns the task if it exists and its project is owned by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn find_task_owned_by(&self, user: UserId, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks t
                     JOIN projects p ON p.id = t.project_id
                     WHERE t.id = ?1 AND p.owner_id = ?2"
                ),
                params![id.to_string(), user.to_string()],
                task_from_row,
            )
            .optional()?)
    }

    /// Returns a task by id without any ownership check.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn find_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self
            .tx
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1"),
                params![id.to_string()],
                task_from_row,
            )
            .optional()?)
    }

    /// Returns the tasks of one column ordered by position, optionally
    /// leaving one task out.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn find_tasks_by_column(
        &self,
        project: ProjectId,
        status: TaskStatus,
        exclude: Option<TaskId>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t
             WHERE t.project_id = ?1 AND t.status = ?2 AND (?3 IS NULL OR t.id <> ?3)
             ORDER BY t.position ASC, t.created_at ASC, t.id ASC"
        ))?;
        let rows = stmt.query_map(
            params![
                project.to_string(),
                status.as_str(),
                exclude.map(|id| id.to_string()),
            ],
            task_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns every task of a project ordered by status (board order) then position.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn find_tasks_by_project(&self, project: ProjectId) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.project_id = ?1
             ORDER BY t.position ASC, t.created_at ASC, t.id ASC"
        ))?;
        let rows = stmt.query_map(params![project.to_string()], task_from_row)?;
        let mut tasks = rows.collect::<Result<Vec<_>, _>>()?;
        // Stable sort keeps the position order inside each status.
        tasks.sort_by_key(|t| t.status);
        Ok(tasks)
    }

    /// Number of tasks in one column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn count_column(&self, project: ProjectId, status: TaskStatus) -> Result<u32, StoreError> {
        Ok(self.tx.query_row(
            "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND status = ?2",
            params![project.to_string(), status.as_str()],
            |row| row.get(0),
        )?)
    }

    /// Inserts a new task row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    pub fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO tasks
               (id, project_id, title, description, status, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id.to_string(),
                task.project_id.to_string(),
                task.title,
                task.description,
                task.status.as_str(),
                task.position,
                task.created_at.timestamp_millis(),
                task.updated_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Writes title, description, status, and `updated_at`. Position is left
    /// to [`update_task_position_batch`](Self::update_task_position_batch).
    ///
    /// Returns `false` if the task no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    pub fn update_task_fields(&self, task: &Task) -> Result<bool, StoreError> {
        let updated = self.tx.execute(
            "UPDATE tasks SET title = ?1, description = ?2, status = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                task.title,
                task.description,
                task.status.as_str(),
                task.updated_at.timestamp_millis(),
                task.id.to_string(),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Assigns `position = index` to every id in `order`.
    ///
    /// Rows already at their index are not rewritten. Returns the number of
    /// rows whose position changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any update fails.
    pub fn update_task_position_batch(
        &self,
        order: &[TaskId],
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut stmt = self.tx.prepare_cached(
            "UPDATE tasks SET position = ?1, updated_at = ?2 WHERE id = ?3 AND position <> ?1",
        )?;
        let mut changed = 0;
        for (index, id) in order.iter().enumerate() {
            changed += stmt.execute(params![
                position_at(index),
                at.timestamp_millis(),
                id.to_string()
            ])?;
        }
        Ok(changed)
    }

    /// Deletes a task row. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    pub fn delete_task(&self, id: TaskId) -> Result<bool, StoreError> {
        let deleted = self
            .tx
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn conversion_error(
    index: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, ty, Box::new(err))
}

fn uuid_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(index)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(index, Type::Text, e))
}

fn time_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(index)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(index, millis))
}

fn status_column(row: &Row<'_>, index: usize) -> rusqlite::Result<TaskStatus> {
    let text: String = row.get(index)?;
    text.parse().map_err(|e| conversion_error(index, Type::Text, e))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::from_uuid(uuid_column(row, 0)?),
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: time_column(row, 3)?,
        updated_at: time_column(row, 4)?,
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: ProjectId::from_uuid(uuid_column(row, 0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: UserId::from_uuid(uuid_column(row, 3)?),
        created_at: time_column(row, 4)?,
        updated_at: time_column(row, 5)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: TaskId::from_uuid(uuid_column(row, 0)?),
        project_id: ProjectId::from_uuid(uuid_column(row, 1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        status: status_column(row, 4)?,
        position: row.get(5)?,
        created_at: time_column(row, 6)?,
        updated_at: time_column(row, 7)?,
    })
}
