//! Kanban board server.
//!
//! An axum HTTP server over a SQLite database. Every board mutation runs in
//! one write transaction, so task positions stay dense under concurrent
//! requests and across processes sharing the database file.
//!
//! # Usage
//!
//! ```bash
//! # Run on the default address 127.0.0.1:3000
//! cargo run --bin kanban-server
//!
//! # Custom address and database
//! cargo run --bin kanban-server -- --bind 0.0.0.0:8080 --database ./board.db
//!
//! # Throwaway in-memory database
//! KANBAN_DATABASE=:memory: cargo run --bin kanban-server
//! ```

use std::sync::Arc;

use clap::Parser;
use kanban_server::api::{self, AppState};
use kanban_server::auth::SessionAuth;
use kanban_server::config::{ServerCliArgs, ServerConfig};
use kanban_server::store::SqliteStore;

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store = if config.is_in_memory() {
        SqliteStore::open_in_memory()
    } else {
        SqliteStore::open(&config.database_path, config.busy_timeout)
    };
    let store = match store {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!(
                error = %e,
                path = %config.database_path.display(),
                "failed to open database"
            );
            std::process::exit(1);
        }
    };
    tracing::info!(
        addr = %config.bind_addr,
        database = %config.database_path.display(),
        "starting kanban server"
    );

    let auth = SessionAuth::with_config(
        Arc::clone(&store),
        config.session_ttl_hours,
        config.password_iterations,
    );
    let state = Arc::new(AppState::new(store, auth));

    match api::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "kanban server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "kanban server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start kanban server");
            std::process::exit(1);
        }
    }
}
