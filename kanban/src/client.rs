//! Typed HTTP client for the board server.
//!
//! [`BoardClient`] wraps every `/api` route. Non-2xx responses are decoded
//! from the server's `{statusCode, message}` body into [`ClientError::Api`].

use kanban_proto::ids::{ProjectId, TaskId};
use kanban_proto::project::{
    CreateProjectRequest, Project, ProjectWithTasks, UpdateProjectRequest,
};
use kanban_proto::task::{Board, CreateTaskRequest, Task, UpdateTaskRequest};
use kanban_proto::user::{
    AuthResponse, ErrorResponse, LoginRequest, RegisterRequest, SuccessResponse, User,
};
use kanban_proto::validation::ValidationError;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

/// Errors returned by [`BoardClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The configured server URL is not a valid base URL.
    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Human-readable message from the error body.
        message: String,
    },

    /// A protected route was called without a token.
    #[error("not logged in; run `kanban login` first")]
    NotLoggedIn,

    /// The request was rejected locally before sending.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ClientError {
    /// Returns `true` if the server reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// HTTP client bound to one server and, optionally, one bearer token.
#[derive(Debug, Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    api: Url,
    token: Option<String>,
}

impl BoardClient {
    /// Creates a client for the server at `server_url` (e.g.
    /// `http://127.0.0.1:3000`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the URL cannot be parsed.
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(server_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api: base.join("api/")?,
            token: None,
        })
    }

    /// Returns the client with `token` attached to every protected request.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// The current bearer token.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    /// Registers a user and keeps the returned token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Validation`] for input the server would reject,
    /// and [`ClientError::Api`] with status 409 if the email is taken.
    pub async fn register(&mut self, req: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        req.validate()?;
        let resp: AuthResponse = self
            .send(self.request(Method::POST, "auth/register")?.json(req))
            .await?;
        self.token = Some(resp.access_token.clone());
        Ok(resp)
    }

    /// Logs in and keeps the returned token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] with status 401 on bad credentials.
    pub async fn login(&mut self, req: &LoginRequest) -> Result<AuthResponse, ClientError> {
        let resp: AuthResponse = self
            .send(self.request(Method::POST, "auth/login")?.json(req))
            .await?;
        self.token = Some(resp.access_token.clone());
        Ok(resp)
    }

    /// Returns the logged-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or server errors.
    pub async fn me(&self) -> Result<User, ClientError> {
        self.send(self.authed(Method::GET, "auth/me")?).await
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Lists the caller's projects, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or server errors.
    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.send(self.authed(Method::GET, "projects")?).await
    }

    /// Creates a project.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on invalid input, transport, or server errors.
    pub async fn create_project(&self, req: &CreateProjectRequest) -> Result<Project, ClientError> {
        req.validate()?;
        self.send(self.authed(Method::POST, "projects")?.json(req))
            .await
    }

    /// Returns a project with all of its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or server errors.
    pub async fn get_project(&self, id: ProjectId) -> Result<ProjectWithTasks, ClientError> {
        self.send(self.authed(Method::GET, &format!("projects/{id}"))?)
            .await
    }

    /// Updates a project's name and/or description.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on invalid input, transport, or server errors.
    pub async fn update_project(
        &self,
        id: ProjectId,
        req: &UpdateProjectRequest,
    ) -> Result<Project, ClientError> {
        req.validate()?;
        self.send(
            self.authed(Method::PATCH, &format!("projects/{id}"))?
                .json(req),
        )
        .await
    }

    /// Deletes a project and its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or server errors.
    pub async fn delete_project(&self, id: ProjectId) -> Result<(), ClientError> {
        let _: SuccessResponse = self
            .send(self.authed(Method::DELETE, &format!("projects/{id}"))?)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Fetches every column of a project's board.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or server errors.
    pub async fn list_board(&self, project: ProjectId) -> Result<Board, ClientError> {
        self.send(self.authed(Method::GET, &format!("projects/{project}/tasks"))?)
            .await
    }

    /// Appends a task to a column.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on invalid input, transport, or server errors.
    pub async fn create_task(
        &self,
        project: ProjectId,
        req: &CreateTaskRequest,
    ) -> Result<Task, ClientError> {
        req.validate()?;
        self.send(
            self.authed(Method::POST, &format!("projects/{project}/tasks"))?
                .json(req),
        )
        .await
    }

    /// Partial update; runs a move on the server when status or position is set.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on invalid input, transport, or server errors.
    pub async fn update_task(&self, id: TaskId, req: &UpdateTaskRequest) -> Result<Task, ClientError> {
        req.validate()?;
        self.send(self.authed(Method::PATCH, &format!("tasks/{id}"))?.json(req))
            .await
    }

    /// Moves a task to another column and/or position.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on invalid input, transport, or server errors.
    pub async fn move_task(&self, id: TaskId, req: &UpdateTaskRequest) -> Result<Task, ClientError> {
        req.validate()?;
        self.send(
            self.authed(Method::PATCH, &format!("tasks/{id}/move"))?
                .json(req),
        )
        .await
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport or server errors.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), ClientError> {
        let _: SuccessResponse = self
            .send(self.authed(Method::DELETE, &format!("tasks/{id}"))?)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self.http.request(method, self.api.join(path)?))
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        Ok(self.request(method, path)?.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };
        tracing::warn!(status = status.as_u16(), message = %message, "server rejected request");
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
