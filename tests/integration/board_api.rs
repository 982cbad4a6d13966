//! Integration tests for the HTTP board API.
//!
//! Starts a real server on an ephemeral port and drives it with reqwest:
//! register, create a project, append tasks, move and delete them, and check
//! the status codes and JSON bodies of the failure paths.
//!
//! Verification command: `cargo test --test board_api`

use std::sync::Arc;

use kanban_proto::project::Project;
use kanban_proto::task::{Board, Task, TaskStatus};
use kanban_proto::user::{AuthResponse, ErrorResponse};
use kanban_server::api::{AppState, start_server_with_state};
use kanban_server::auth::SessionAuth;
use kanban_server::store::SqliteStore;
use reqwest::StatusCode;
use serde_json::{Value, json};

// =============================================================================
// Helpers
// =============================================================================

struct TestServer {
    base: String,
    http: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl TestServer {
    async fn start() -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let auth = SessionAuth::with_config(Arc::clone(&store), 1, 4);
        let state = Arc::new(AppState::new(store, auth));
        let (addr, handle) = start_server_with_state("127.0.0.1:0", state)
            .await
            .expect("failed to start test server");
        Self {
            base: format!("http://{addr}/api"),
            http: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn register(&self, email: &str) -> String {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(&json!({ "email": email, "password": "password123" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json::<AuthResponse>().await.unwrap().access_token
    }

    async fn create_project(&self, token: &str, name: &str) -> Project {
        let resp = self
            .http
            .post(self.url("/projects"))
            .bearer_auth(token)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    async fn add_task(&self, token: &str, project: &Project, title: &str, status: &str) -> Task {
        let resp = self
            .http
            .post(self.url(&format!("/projects/{}/tasks", project.id)))
            .bearer_auth(token)
            .json(&json!({ "title": title, "status": status }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    async fn move_task(&self, token: &str, task: &Task, body: Value) -> reqwest::Response {
        self.http
            .patch(self.url(&format!("/tasks/{}/move", task.id)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn board(&self, token: &str, project: &Project) -> Board {
        let resp = self
            .http
            .get(self.url(&format!("/projects/{}/tasks", project.id)))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        resp.json().await.unwrap()
    }
}

fn titles(board: &Board, status: TaskStatus) -> Vec<String> {
    board.column(status).iter().map(|t| t.title.clone()).collect()
}

fn positions(board: &Board, status: TaskStatus) -> Vec<u32> {
    board.column(status).iter().map(|t| t.position).collect()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::start().await;
    let url = server.base.trim_end_matches("/api").to_string() + "/health";
    let resp = server.http.get(url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn cors_preflight_mirrors_origin() {
    let server = TestServer::start().await;
    let origin = "http://localhost:5173";

    let resp = server
        .http
        .request(reqwest::Method::OPTIONS, server.url("/projects"))
        .header("Origin", origin)
        .header("Access-Control-Request-Method", "POST")
        .header(
            "Access-Control-Request-Headers",
            "authorization,content-type",
        )
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "preflight got {}", resp.status());
    let headers = resp.headers();
    assert_eq!(headers["access-control-allow-origin"], origin);
    assert_eq!(headers["access-control-allow-credentials"], "true");
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("POST"));
    let allowed = headers["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("authorization"));

    // Actual cross-origin requests carry the header too, errors included.
    let resp = server
        .http
        .get(server.url("/projects"))
        .header("Origin", origin)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()["access-control-allow-origin"], origin);
}

#[tokio::test]
async fn board_lifecycle() {
    let server = TestServer::start().await;
    let token = server.register("ada@example.com").await;
    let project = server.create_project(&token, "Launch").await;

    let a = server.add_task(&token, &project, "A", "TODO").await;
    let b = server.add_task(&token, &project, "B", "TODO").await;
    let c = server.add_task(&token, &project, "C", "TODO").await;
    server.add_task(&token, &project, "D", "IN_PROGRESS").await;
    assert_eq!((a.position, b.position, c.position), (0, 1, 2));

    // Reorder within the column.
    let resp = server.move_task(&token, &c, json!({ "position": 0 })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let board = server.board(&token, &project).await;
    assert_eq!(titles(&board, TaskStatus::Todo), ["C", "A", "B"]);
    assert_eq!(positions(&board, TaskStatus::Todo), [0, 1, 2]);

    // Move across columns.
    let resp = server
        .move_task(&token, &b, json!({ "status": "IN_PROGRESS", "position": 0 }))
        .await;
    let moved: Task = resp.json().await.unwrap();
    assert_eq!(moved.status, TaskStatus::InProgress);
    assert_eq!(moved.position, 0);
    let board = server.board(&token, &project).await;
    assert_eq!(titles(&board, TaskStatus::Todo), ["C", "A"]);
    assert_eq!(titles(&board, TaskStatus::InProgress), ["B", "D"]);
    assert_eq!(positions(&board, TaskStatus::InProgress), [0, 1]);

    // Delete closes the gap.
    let resp = server
        .http
        .delete(server.url(&format!("/tasks/{}", c.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({ "success": true })
    );
    let board = server.board(&token, &project).await;
    assert_eq!(titles(&board, TaskStatus::Todo), ["A"]);
    assert_eq!(positions(&board, TaskStatus::Todo), [0]);
}

#[tokio::test]
async fn board_response_has_every_column() {
    let server = TestServer::start().await;
    let token = server.register("ada@example.com").await;
    let project = server.create_project(&token, "Empty").await;

    let resp = server
        .http
        .get(server.url(&format!("/projects/{}/tasks", project.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "TODO": [], "IN_PROGRESS": [], "DONE": [] })
    );
}

#[tokio::test]
async fn out_of_range_positions_clamp() {
    let server = TestServer::start().await;
    let token = server.register("ada@example.com").await;
    let project = server.create_project(&token, "Clamp").await;
    let a = server.add_task(&token, &project, "A", "TODO").await;
    server.add_task(&token, &project, "B", "TODO").await;

    let moved: Task = server
        .move_task(&token, &a, json!({ "position": 999 }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(moved.position, 1);

    let moved: Task = server
        .move_task(&token, &a, json!({ "position": -5 }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(moved.position, 0);
}

#[tokio::test]
async fn patch_with_position_runs_a_move() {
    let server = TestServer::start().await;
    let token = server.register("ada@example.com").await;
    let project = server.create_project(&token, "Patch").await;
    server.add_task(&token, &project, "A", "TODO").await;
    let b = server.add_task(&token, &project, "B", "TODO").await;

    let resp = server
        .http
        .patch(server.url(&format!("/tasks/{}", b.id)))
        .bearer_auth(&token)
        .json(&json!({ "title": "B!", "position": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let board = server.board(&token, &project).await;
    assert_eq!(titles(&board, TaskStatus::Todo), ["B!", "A"]);
}

#[tokio::test]
async fn strangers_get_not_found() {
    let server = TestServer::start().await;
    let owner = server.register("owner@example.com").await;
    let stranger = server.register("stranger@example.com").await;
    let project = server.create_project(&owner, "Private").await;
    let task = server.add_task(&owner, &project, "secret", "TODO").await;

    let resp = server
        .http
        .get(server.url(&format!("/projects/{}/tasks", project.id)))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.status_code, 404);

    let resp = server
        .move_task(&stranger, &task, json!({ "status": "DONE" }))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = server
        .http
        .delete(server.url(&format!("/tasks/{}", task.id)))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Owner's board is untouched.
    let board = server.board(&owner, &project).await;
    assert_eq!(titles(&board, TaskStatus::Todo), ["secret"]);
}

#[tokio::test]
async fn malformed_ids_are_not_found() {
    let server = TestServer::start().await;
    let token = server.register("ada@example.com").await;
    let resp = server
        .http
        .delete(server.url("/tasks/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let server = TestServer::start().await;
    let resp = server
        .http
        .get(server.url("/projects"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = server
        .http
        .get(server.url("/auth/me"))
        .bearer_auth("deadbeef")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.status_code, 401);
}

#[tokio::test]
async fn validation_and_conflict_errors() {
    let server = TestServer::start().await;
    let token = server.register("ada@example.com").await;

    let resp = server
        .http
        .post(server.url("/auth/register"))
        .json(&json!({ "email": "ADA@example.com", "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let project = server.create_project(&token, "Rules").await;
    let resp = server
        .http
        .post(server.url(&format!("/projects/{}/tasks", project.id)))
        .bearer_auth(&token)
        .json(&json!({ "title": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .http
        .post(server.url(&format!("/projects/{}/tasks", project.id)))
        .bearer_auth(&token)
        .json(&json!({ "title": "x", "status": "BLOCKED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = resp.json().await.unwrap();
    assert_eq!(body.status_code, 400);
}

#[tokio::test]
async fn login_and_profile() {
    let server = TestServer::start().await;
    server.register("ada@example.com").await;

    let resp = server
        .http
        .post(server.url("/auth/login"))
        .json(&json!({ "email": "ada@example.com", "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let auth: AuthResponse = resp.json().await.unwrap();

    let me: Value = server
        .http
        .get(server.url("/auth/me"))
        .bearer_auth(&auth.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["email"], "ada@example.com");
    assert!(me.get("passwordHash").is_none());

    let resp = server
        .http
        .post(server.url("/auth/login"))
        .json(&json!({ "email": "ada@example.com", "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleting_project_removes_its_board() {
    let server = TestServer::start().await;
    let token = server.register("ada@example.com").await;
    let project = server.create_project(&token, "Doomed").await;
    let task = server.add_task(&token, &project, "t", "DONE").await;

    let resp = server
        .http
        .delete(server.url(&format!("/projects/{}", project.id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = server
        .move_task(&token, &task, json!({ "position": 0 }))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let projects: Vec<Project> = server
        .http
        .get(server.url("/projects"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(projects.is_empty());
}
