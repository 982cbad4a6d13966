//! HTTP surface of the board server.
//!
//! An axum router under `/api` that authenticates every protected route with
//! a bearer token, runs store work on the blocking pool, and maps
//! [`BoardError`] onto status codes with a JSON `{statusCode, message}` body.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use kanban_proto::ids::{ProjectId, TaskId, UserId};
use kanban_proto::project::{
    CreateProjectRequest, Project, ProjectWithTasks, UpdateProjectRequest,
};
use kanban_proto::task::{Board, CreateTaskRequest, Task, UpdateTaskRequest};
use kanban_proto::user::{
    AuthResponse, ErrorResponse, LoginRequest, RegisterRequest, SuccessResponse, User,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::auth::SessionAuth;
use crate::board::BoardEngine;
use crate::error::BoardError;
use crate::projects::ProjectService;
use crate::store::SqliteStore;

/// Shared state behind every request.
pub struct AppState {
    pub engine: BoardEngine,
    pub projects: ProjectService,
    pub auth: Arc<SessionAuth>,
}

impl AppState {
    /// Wires the engine, the project service, and the identity provider
    /// over one store.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, auth: SessionAuth) -> Self {
        let auth = Arc::new(auth);
        Self {
            engine: BoardEngine::new(Arc::clone(&store), auth.clone()),
            projects: ProjectService::new(store),
            auth,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error returned by handlers and extractors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Board(#[from] BoardError),

    /// The body was not valid JSON for the route.
    #[error("{0}")]
    BadRequest(String),

    /// A blocking store task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Board(BoardError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Board(BoardError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Board(BoardError::Validation(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Board(BoardError::Unauthenticated(_)) => StatusCode::UNAUTHORIZED,
            Self::Board(BoardError::Transaction(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Board(BoardError::Store(_)) | Self::Join(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "request rejected");
            self.to_string()
        };
        let body = ErrorResponse {
            status_code: status.as_u16(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Runs store work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BoardError> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Parses a path id. Anything unparsable cannot name an existing row.
fn parse_id<T: FromStr>(raw: &str, resource: &'static str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Board(BoardError::NotFound(resource)))
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// The authenticated user of a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or(BoardError::Unauthenticated("Missing bearer token"))?
            .to_string();
        let state = Arc::clone(state);
        let user = blocking(move || state.engine.resolve_caller(&token)).await?;
        Ok(Self(user))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Builds the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/projects/{id}/tasks", get(list_board).post(create_task))
        .route("/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/tasks/{id}/move", patch(move_task));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .layer(cors_layer())
        .with_state(state)
}

/// Lets browser front ends on any origin call the API with credentials.
///
/// Credentialed requests cannot use a wildcard, so the preflight's own
/// values are echoed back instead.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Starts the server on `addr` with a fresh in-memory database.
///
/// # Errors
///
/// Returns an error if the database cannot be created or the listener
/// cannot bind.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let auth = SessionAuth::new(Arc::clone(&store));
    start_server_with_state(addr, Arc::new(AppState::new(store, auth))).await
}

/// Starts the server with a pre-built [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "board server error");
        }
    });

    Ok((bound_addr, handle))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> &'static str {
    "ok"
}

async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let req = body(payload)?;
    let resp = blocking(move || state.auth.register(req)).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let req = body(payload)?;
    Ok(Json(blocking(move || state.auth.login(req)).await?))
}

async fn me(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
) -> Result<Json<User>, ApiError> {
    Ok(Json(blocking(move || state.auth.profile(user)).await?))
}

async fn list_projects(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(blocking(move || state.projects.list(user)).await?))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let req = body(payload)?;
    let project = blocking(move || state.projects.create(user, req)).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> Result<Json<ProjectWithTasks>, ApiError> {
    let id: ProjectId = parse_id(&id, "Project")?;
    Ok(Json(blocking(move || state.projects.get(user, id)).await?))
}

async fn update_project(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> Result<Json<Project>, ApiError> {
    let id: ProjectId = parse_id(&id, "Project")?;
    let req = body(payload)?;
    Ok(Json(
        blocking(move || state.projects.update(user, id, req)).await?,
    ))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id: ProjectId = parse_id(&id, "Project")?;
    blocking(move || state.projects.delete(user, id)).await?;
    Ok(Json(SuccessResponse::OK))
}

async fn list_board(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> Result<Json<Board>, ApiError> {
    let id: ProjectId = parse_id(&id, "Project")?;
    Ok(Json(
        blocking(move || state.engine.list_board(user, id)).await?,
    ))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let project: ProjectId = parse_id(&id, "Project")?;
    let req = body(payload)?;
    let task = blocking(move || state.engine.append_task(user, project, req)).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let id: TaskId = parse_id(&id, "Task")?;
    let req = body(payload)?;
    Ok(Json(
        blocking(move || state.engine.update_task(user, id, &req)).await?,
    ))
}

async fn move_task(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let id: TaskId = parse_id(&id, "Task")?;
    let req = body(payload)?;
    Ok(Json(
        blocking(move || state.engine.move_task(user, id, &req)).await?,
    ))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let id: TaskId = parse_id(&id, "Task")?;
    blocking(move || state.engine.remove_task(user, id)).await?;
    Ok(Json(SuccessResponse::OK))
}
