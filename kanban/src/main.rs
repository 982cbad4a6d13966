//! `kanban`: command-line client for the Kanban board server.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/kanban/config.toml`). `login` and `register` save the access
//! token so later commands are authenticated.
//!
//! ```bash
//! kanban --server http://127.0.0.1:3000 register --email ada@example.com --password hunter22
//! kanban project-create "Launch"
//! kanban add <project-id> "Write release notes" --status IN_PROGRESS
//! kanban move <project-id> <task-id> --status DONE --position 0
//! kanban board <project-id>
//! ```

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;

use kanban::board::LocalBoard;
use kanban::client::{BoardClient, ClientError};
use kanban::config::{self, ClientConfig, ConfigError, GlobalArgs};
use kanban_proto::ids::{ProjectId, TaskId};
use kanban_proto::project::{CreateProjectRequest, Project};
use kanban_proto::task::{Board, CreateTaskRequest, Task, TaskStatus, UpdateTaskRequest};
use kanban_proto::user::{AuthResponse, LoginRequest, RegisterRequest};

/// Command-line client for the Kanban board server.
#[derive(Parser, Debug)]
#[command(version, about = "Kanban board command-line client")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Print raw JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account and save its access token.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "KANBAN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Log in and save the access token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "KANBAN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the logged-in user.
    Whoami,
    /// List your projects, newest first.
    Projects,
    /// Create a project.
    ProjectCreate {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a project and all of its tasks.
    ProjectDelete { project: ProjectId },
    /// Show a project's board.
    Board { project: ProjectId },
    /// Append a task to a column (default TODO).
    Add {
        project: ProjectId,
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// TODO, IN_PROGRESS, or DONE.
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Edit a task's title or description. An empty description clears it.
    Edit {
        task: TaskId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Move a task to another column and/or position.
    Move {
        project: ProjectId,
        task: TaskId,
        /// Destination column (default: the current one).
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Destination index; out-of-range values clamp (default: the end).
        #[arg(long, allow_negative_numbers = true)]
        position: Option<i64>,
    },
    /// Delete a task.
    Rm { project: ProjectId, task: TaskId },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ClientConfig::load(&cli.global) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so stdout only carries command output.
    let _log_guard = init_logging(&config.log_level, &config.log_file);
    tracing::debug!(server = %config.server_url, "kanban starting");

    match run(cli.command, cli.json, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until exit so buffered log
/// entries are flushed.
fn init_logging(level: &str, log_path: &Path) -> Option<WorkerGuard> {
    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, json: bool, config: &ClientConfig) -> Result<(), CliError> {
    let mut client = BoardClient::new(&config.server_url)?.with_token(config.token.clone());

    match command {
        Command::Register {
            email,
            password,
            name,
        } => {
            let resp = client
                .register(&RegisterRequest {
                    email,
                    password,
                    name,
                })
                .await?;
            remember(&resp)?;
            println!("Registered and logged in as {}", resp.user.email);
        }
        Command::Login { email, password } => {
            let resp = client.login(&LoginRequest { email, password }).await?;
            remember(&resp)?;
            println!("Logged in as {}", resp.user.email);
        }
        Command::Whoami => {
            let user = client.me().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                match &user.name {
                    Some(name) => println!("{name} <{}>", user.email),
                    None => println!("{}", user.email),
                }
            }
        }
        Command::Projects => {
            let projects = client.list_projects().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else {
                print!("{}", render_projects(&projects));
            }
        }
        Command::ProjectCreate { name, description } => {
            let project = client
                .create_project(&CreateProjectRequest { name, description })
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&project)?);
            } else {
                println!("Created project {} ({})", project.name, project.id);
            }
        }
        Command::ProjectDelete { project } => {
            client.delete_project(project).await?;
            println!("Deleted project {project}");
        }
        Command::Board { project } => {
            let board = client.list_board(project).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&board)?);
            } else {
                print!("{}", render_board(&board));
            }
        }
        Command::Add {
            project,
            title,
            description,
            status,
        } => {
            let task = client
                .create_task(
                    project,
                    &CreateTaskRequest {
                        title,
                        description,
                        status,
                    },
                )
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("Added {}", describe(&task));
            }
        }
        Command::Edit {
            task,
            title,
            description,
        } => {
            let req = UpdateTaskRequest {
                title,
                description,
                ..Default::default()
            };
            let task = client.update_task(task, &req).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("Updated {}", describe(&task));
            }
        }
        Command::Move {
            project,
            task,
            status,
            position,
        } => {
            let mut local = LocalBoard::fetch(&client, project).await?;
            let req = UpdateTaskRequest {
                status,
                position,
                ..Default::default()
            };
            let moved = local.sync_move(&client, task, &req).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&moved)?);
            } else {
                println!("Moved {}", describe(&moved));
                print!("{}", render_board(local.board()));
            }
        }
        Command::Rm { project, task } => {
            let mut local = LocalBoard::fetch(&client, project).await?;
            local.sync_remove(&client, task).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(local.board())?);
            } else {
                println!("Deleted task {task}");
                print!("{}", render_board(local.board()));
            }
        }
    }
    Ok(())
}

/// Saves the token of a fresh session for later invocations.
fn remember(resp: &AuthResponse) -> Result<(), ConfigError> {
    let path = config::session_path().ok_or(ConfigError::NoConfigDir)?;
    config::save_token(&path, &resp.access_token)?;
    tracing::info!(user_id = %resp.user.id, path = %path.display(), "saved session token");
    Ok(())
}

fn describe(task: &Task) -> String {
    format!(
        "[{} #{}] {} ({})",
        task.status, task.position, task.title, task.id
    )
}

fn render_projects(projects: &[Project]) -> String {
    use std::fmt::Write;

    if projects.is_empty() {
        return "No projects yet. Create one with `kanban project-create <name>`.\n".to_string();
    }
    let mut out = String::new();
    for project in projects {
        let _ = match &project.description {
            Some(description) => writeln!(out, "{}  {}  {description}", project.id, project.name),
            None => writeln!(out, "{}  {}", project.id, project.name),
        };
    }
    out
}

fn render_board(board: &Board) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    for status in TaskStatus::ALL {
        let column = board.column(status);
        let _ = writeln!(out, "{status} ({})", column.len());
        for task in column {
            let _ = writeln!(out, "  {:>3}. {}  {}", task.position, task.title, task.id);
        }
    }
    out
}
