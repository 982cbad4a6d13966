//! Property-based tests for the board ordering engine.
//!
//! Uses proptest to run random sequences of appends, moves, and removals
//! against a real engine and verify after every step:
//! 1. Every column is numbered exactly `0..n`.
//! 2. Column order matches a plain in-memory model of the same operations.
//! 3. No task is lost or duplicated.

use std::collections::HashMap;
use std::sync::Arc;

use kanban_proto::ids::{ProjectId, TaskId, UserId};
use kanban_proto::ordering::{is_dense, splice};
use kanban_proto::project::CreateProjectRequest;
use kanban_proto::task::{CreateTaskRequest, TaskStatus, UpdateTaskRequest};
use kanban_proto::user::RegisterRequest;
use kanban_server::auth::SessionAuth;
use kanban_server::board::BoardEngine;
use kanban_server::projects::ProjectService;
use kanban_server::store::SqliteStore;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Append(TaskStatus),
    Move {
        pick: prop::sample::Index,
        status: Option<TaskStatus>,
        position: Option<i64>,
    },
    Remove(prop::sample::Index),
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_status().prop_map(Op::Append),
        4 => (
            any::<prop::sample::Index>(),
            prop::option::of(arb_status()),
            prop::option::of(-3i64..12),
        )
            .prop_map(|(pick, status, position)| Op::Move { pick, status, position }),
        1 => any::<prop::sample::Index>().prop_map(Op::Remove),
    ]
}

/// Column order the engine should produce, keyed by status.
#[derive(Default)]
struct Model {
    columns: HashMap<TaskStatus, Vec<TaskId>>,
}

impl Model {
    fn column(&mut self, status: TaskStatus) -> &mut Vec<TaskId> {
        self.columns.entry(status).or_default()
    }

    fn all(&self) -> Vec<TaskId> {
        TaskStatus::ALL
            .iter()
            .flat_map(|s| self.columns.get(s).into_iter().flatten().copied())
            .collect()
    }

    fn status_of(&self, id: TaskId) -> Option<TaskStatus> {
        self.columns
            .iter()
            .find(|(_, ids)| ids.contains(&id))
            .map(|(status, _)| *status)
    }
}

struct Harness {
    engine: BoardEngine,
    owner: UserId,
    project: ProjectId,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let auth = Arc::new(SessionAuth::with_config(Arc::clone(&store), 1, 1));
        let owner = auth
            .register(RegisterRequest {
                email: "prop@example.com".to_string(),
                password: "password123".to_string(),
                name: None,
            })
            .unwrap()
            .user
            .id;
        let project = ProjectService::new(Arc::clone(&store))
            .create(
                owner,
                CreateProjectRequest {
                    name: "Prop".to_string(),
                    description: None,
                },
            )
            .unwrap()
            .id;
        Self {
            engine: BoardEngine::new(store, auth),
            owner,
            project,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Random operation sequences keep columns dense and match the model.
    #[test]
    fn operations_preserve_density(ops in prop::collection::vec(arb_op(), 1..40)) {
        let h = Harness::new();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Append(status) => {
                    let task = h.engine.append_task(h.owner, h.project, CreateTaskRequest {
                        title: "t".to_string(),
                        description: None,
                        status: Some(status),
                    }).unwrap();
                    prop_assert_eq!(usize::try_from(task.position).unwrap(), model.column(status).len());
                    model.column(status).push(task.id);
                }
                Op::Move { pick, status, position } => {
                    let all = model.all();
                    if all.is_empty() {
                        continue;
                    }
                    let id = all[pick.index(all.len())];
                    let Some(source) = model.status_of(id) else { continue };
                    let destination = status.unwrap_or(source);
                    let req = UpdateTaskRequest { status, position, ..Default::default() };
                    h.engine.move_task(h.owner, id, &req).unwrap();

                    model.column(source).retain(|t| *t != id);
                    let column = std::mem::take(model.column(destination));
                    *model.column(destination) = splice(column, id, position);
                }
                Op::Remove(pick) => {
                    let all = model.all();
                    if all.is_empty() {
                        continue;
                    }
                    let id = all[pick.index(all.len())];
                    h.engine.remove_task(h.owner, id).unwrap();
                    for ids in model.columns.values_mut() {
                        ids.retain(|t| *t != id);
                    }
                }
            }

            let board = h.engine.list_board(h.owner, h.project).unwrap();
            prop_assert_eq!(board.len(), model.all().len());
            for status in TaskStatus::ALL {
                let column = board.column(status);
                prop_assert!(is_dense(column.iter().map(|t| t.position)));
                let ids: Vec<TaskId> = column.iter().map(|t| t.id).collect();
                prop_assert_eq!(ids, model.column(status).clone());
            }
        }
    }
}
