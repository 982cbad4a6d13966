//! Project service: per-user project CRUD.
//!
//! Every lookup is filtered by owner. A project that exists but belongs to
//! someone else is reported as [`BoardError::NotFound`].

use std::sync::Arc;

use kanban_proto::ids::{ProjectId, UserId};
use kanban_proto::project::{
    CreateProjectRequest, Project, ProjectWithTasks, UpdateProjectRequest,
};

use crate::error::BoardError;
use crate::store::{self, SqliteStore};

/// Creates, lists, updates, and deletes projects.
pub struct ProjectService {
    store: Arc<SqliteStore>,
}

impl ProjectService {
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Creates a project owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for bad input.
    pub fn create(&self, owner: UserId, req: CreateProjectRequest) -> Result<Project, BoardError> {
        req.validate()?;
        let at = store::now();
        let project = Project {
            id: ProjectId::new(),
            name: req.name,
            description: req.description.filter(|d| !d.is_empty()),
            owner_id: owner,
            created_at: at,
            updated_at: at,
        };
        self.store.write(|tx| tx.insert_project(&project))?;
        tracing::info!(project_id = %project.id, owner_id = %owner, "project created");
        Ok(project)
    }

    /// Lists the caller's projects, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if the query fails.
    pub fn list(&self, owner: UserId) -> Result<Vec<Project>, BoardError> {
        Ok(self.store.read(|tx| tx.list_projects(owner))?)
    }

    /// Returns a project together with its tasks in board order.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if `owner` does not own the project.
    pub fn get(&self, owner: UserId, id: ProjectId) -> Result<ProjectWithTasks, BoardError> {
        self.store.read(|tx| {
            let project = tx
                .find_project_owned_by(owner, id)?
                .ok_or(BoardError::NotFound("Project"))?;
            let tasks = tx.find_tasks_by_project(id)?;
            Ok(ProjectWithTasks { project, tasks })
        })
    }

    /// Updates name and/or description. An empty description clears it.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Validation`] for bad input and
    /// [`BoardError::NotFound`] if `owner` does not own the project.
    pub fn update(
        &self,
        owner: UserId,
        id: ProjectId,
        req: UpdateProjectRequest,
    ) -> Result<Project, BoardError> {
        req.validate()?;
        self.store.write(|tx| {
            let mut project = tx
                .find_project_owned_by(owner, id)?
                .ok_or(BoardError::NotFound("Project"))?;
            if req.name.is_none() && req.description.is_none() {
                return Ok(project);
            }
            if let Some(name) = req.name {
                project.name = name;
            }
            if let Some(description) = req.description {
                project.description = (!description.is_empty()).then_some(description);
            }
            project.updated_at = store::now();
            tx.update_project(&project)?;
            tracing::debug!(project_id = %id, "project updated");
            Ok(project)
        })
    }

    /// Deletes a project and all of its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if `owner` does not own the project.
    pub fn delete(&self, owner: UserId, id: ProjectId) -> Result<(), BoardError> {
        self.store.write(|tx| {
            if tx.find_project_owned_by(owner, id)?.is_none() {
                return Err(BoardError::NotFound("Project"));
            }
            tx.delete_project(id)?;
            Ok::<_, BoardError>(())
        })?;
        tracing::info!(project_id = %id, "project deleted");
        Ok(())
    }
}
