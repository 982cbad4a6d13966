//! Integration tests for the client's optimistic board.
//!
//! Runs a real server on an ephemeral port and drives it through
//! `BoardClient` and `LocalBoard`: local previews must match what the server
//! later returns, and a rejected move must leave the local board equal to
//! the server's, not to the speculative edit.
//!
//! Verification command: `cargo test --test client_reconcile`

use std::sync::Arc;

use kanban::board::LocalBoard;
use kanban::client::{BoardClient, ClientError};
use kanban_proto::ids::TaskId;
use kanban_proto::project::{CreateProjectRequest, Project};
use kanban_proto::task::{CreateTaskRequest, TaskStatus, UpdateTaskRequest};
use kanban_proto::user::RegisterRequest;
use kanban_server::api::{AppState, start_server_with_state};
use kanban_server::auth::SessionAuth;
use kanban_server::store::SqliteStore;

struct Fixture {
    base: String,
    client: BoardClient,
    project: Project,
    tasks: Vec<TaskId>,
    _handle: AbortOnDrop,
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Server with one user, one project, and TODO tasks "A", "B", "C".
async fn fixture() -> Fixture {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let auth = SessionAuth::with_config(Arc::clone(&store), 1, 4);
    let state = Arc::new(AppState::new(store, auth));
    let (addr, handle) = start_server_with_state("127.0.0.1:0", state)
        .await
        .expect("failed to start test server");

    let base = format!("http://{addr}");
    let mut client = BoardClient::new(&base).unwrap();
    client
        .register(&RegisterRequest {
            email: "client@example.com".to_string(),
            password: "password123".to_string(),
            name: Some("Client".to_string()),
        })
        .await
        .unwrap();
    assert!(client.token().is_some());

    let project = client
        .create_project(&CreateProjectRequest {
            name: "Reconcile".to_string(),
            description: None,
        })
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for title in ["A", "B", "C"] {
        let task = client
            .create_task(
                project.id,
                &CreateTaskRequest {
                    title: title.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        tasks.push(task.id);
    }

    Fixture {
        base,
        client,
        project,
        tasks,
        _handle: AbortOnDrop(handle),
    }
}

fn titles(local: &LocalBoard, status: TaskStatus) -> Vec<String> {
    local
        .board()
        .column(status)
        .iter()
        .map(|t| t.title.clone())
        .collect()
}

#[tokio::test]
async fn local_preview_matches_server_result() {
    let f = fixture().await;
    let mut local = LocalBoard::fetch(&f.client, f.project.id).await.unwrap();

    let req = UpdateTaskRequest {
        status: Some(TaskStatus::Done),
        position: Some(0),
        ..Default::default()
    };
    assert!(local.apply_move(f.tasks[1], req.status, req.position));
    let preview = local.board().clone();

    let moved = local.sync_move(&f.client, f.tasks[1], &req).await.unwrap();
    assert_eq!(moved.status, TaskStatus::Done);
    assert_eq!(moved.position, 0);
    assert!(!local.is_speculative());

    let server = f.client.list_board(f.project.id).await.unwrap();
    assert_eq!(local.board(), &server);

    // Same order and numbering as the preview; timestamps come from the server.
    for status in TaskStatus::ALL {
        let expected: Vec<_> = preview
            .column(status)
            .iter()
            .map(|t| (t.id, t.position))
            .collect();
        let actual: Vec<_> = server
            .column(status)
            .iter()
            .map(|t| (t.id, t.position))
            .collect();
        assert_eq!(actual, expected, "column {status}");
    }
}

#[tokio::test]
async fn clamped_move_reconciles_to_the_end() {
    let f = fixture().await;
    let mut local = LocalBoard::fetch(&f.client, f.project.id).await.unwrap();

    let req = UpdateTaskRequest {
        position: Some(99),
        ..Default::default()
    };
    let moved = local.sync_move(&f.client, f.tasks[0], &req).await.unwrap();
    assert_eq!(moved.position, 2);
    assert_eq!(titles(&local, TaskStatus::Todo), ["B", "C", "A"]);
}

#[tokio::test]
async fn rejected_move_rolls_back_to_server_state() {
    let f = fixture().await;
    let mut local = LocalBoard::fetch(&f.client, f.project.id).await.unwrap();

    // Another session deletes the task after our snapshot was taken.
    f.client.delete_task(f.tasks[0]).await.unwrap();

    let req = UpdateTaskRequest {
        status: Some(TaskStatus::InProgress),
        ..Default::default()
    };
    let err = local
        .sync_move(&f.client, f.tasks[0], &req)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");

    assert!(!local.is_speculative());
    assert!(local.board().column(TaskStatus::InProgress).is_empty());
    assert_eq!(titles(&local, TaskStatus::Todo), ["B", "C"]);
    let positions: Vec<u32> = local.board().todo.iter().map(|t| t.position).collect();
    assert_eq!(positions, [0, 1]);
}

#[tokio::test]
async fn sync_remove_closes_the_gap() {
    let f = fixture().await;
    let mut local = LocalBoard::fetch(&f.client, f.project.id).await.unwrap();

    local.sync_remove(&f.client, f.tasks[1]).await.unwrap();

    let column: Vec<(String, u32)> = local
        .board()
        .todo
        .iter()
        .map(|t| (t.title.clone(), t.position))
        .collect();
    assert_eq!(column, [("A".to_string(), 0), ("C".to_string(), 1)]);
    assert_eq!(local.board(), &f.client.list_board(f.project.id).await.unwrap());
}

#[tokio::test]
async fn other_users_board_is_not_found() {
    let f = fixture().await;

    let mut stranger = BoardClient::new(&f.base).unwrap();
    stranger
        .register(&RegisterRequest {
            email: "stranger@example.com".to_string(),
            password: "password123".to_string(),
            name: None,
        })
        .await
        .unwrap();

    let err = LocalBoard::fetch(&stranger, f.project.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn missing_token_fails_before_sending() {
    let f = fixture().await;
    let anonymous = BoardClient::new(&f.base).unwrap();
    let err = anonymous.list_board(f.project.id).await.unwrap_err();
    assert!(matches!(err, ClientError::NotLoggedIn));
}
