//! Configuration for the Kanban server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban-server/config.toml`)
//! 4. Compiled defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{DEFAULT_PASSWORD_ITERATIONS, DEFAULT_SESSION_TTL_HOURS};
use crate::store::DEFAULT_BUSY_TIMEOUT;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerSection,
    storage: StorageSection,
    auth: AuthSection,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
}

/// `[storage]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageSection {
    database_path: Option<PathBuf>,
    busy_timeout_ms: Option<u64>,
}

/// `[auth]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthSection {
    session_ttl_hours: Option<i64>,
    password_iterations: Option<u32>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board server")]
pub struct ServerCliArgs {
    /// Address to bind the HTTP server to.
    #[arg(short, long, env = "KANBAN_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/kanban-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite database file, or `:memory:` for a throwaway database.
    #[arg(short, long, env = "KANBAN_DATABASE")]
    pub database: Option<PathBuf>,

    /// Milliseconds a writer waits for the database lock.
    #[arg(long)]
    pub busy_timeout_ms: Option<u64>,

    /// Lifetime of issued access tokens, in hours.
    #[arg(long)]
    pub session_ttl_hours: Option<i64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "KANBAN_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `127.0.0.1:3000`).
    pub bind_addr: String,
    /// SQLite database file. `:memory:` selects a private in-memory database.
    pub database_path: PathBuf,
    /// Time a writer waits for the database lock before failing.
    pub busy_timeout: Duration,
    /// Lifetime of issued access tokens, in hours.
    pub session_ttl_hours: i64,
    /// Hash rounds applied to password secrets.
    pub password_iterations: u32,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            database_path: default_database_path(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Returns `true` if the database should live in memory only.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            database_path: cli
                .database
                .clone()
                .or_else(|| file.storage.database_path.clone())
                .unwrap_or(defaults.database_path),
            busy_timeout: cli
                .busy_timeout_ms
                .or(file.storage.busy_timeout_ms)
                .map_or(defaults.busy_timeout, Duration::from_millis),
            session_ttl_hours: cli
                .session_ttl_hours
                .or(file.auth.session_ttl_hours)
                .unwrap_or(defaults.session_ttl_hours),
            password_iterations: file
                .auth
                .password_iterations
                .unwrap_or(defaults.password_iterations),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_database_path() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("kanban.db"),
        |dir| dir.join("kanban-server").join("kanban.db"),
    )
}

/// Load and parse the TOML config file.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ServerConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ServerConfigFile::default());
    };
    let path = config_dir.join("kanban-server").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
