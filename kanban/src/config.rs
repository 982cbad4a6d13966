//! Configuration for the `kanban` command-line client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/kanban/config.toml`)
//! 4. The token saved by the last `login` or `register`
//! 5. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::{Path, PathBuf};

/// Server used when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Errors that can occur when loading configuration or the saved session.
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

    /// Failed to write the saved session.
    #[error("failed to write {path}: {source}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// Could not determine the user's config directory.
    #[error("could not determine config directory (no HOME or XDG_CONFIG_HOME)")]
    NoConfigDir,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    client: ClientFileConfig,
}

/// `[client]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientFileConfig {
    server_url: Option<String>,
    token: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Options shared by every subcommand.
#[derive(clap::Args, Debug, Default)]
pub struct GlobalArgs {
    /// Base URL of the board server.
    #[arg(long, global = true, env = "KANBAN_SERVER")]
    pub server: Option<String>,

    /// Bearer token (default: the one saved by `login`).
    #[arg(long, global = true, env = "KANBAN_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to config file (default: `~/.config/kanban/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "KANBAN_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/kanban.log`).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the board server.
    pub server_url: String,
    /// Bearer token, if the user has logged in.
    pub token: Option<String>,
    /// Log level filter string.
    pub log_level: String,
    /// Log file location.
    pub log_file: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            token: None,
            log_level: "info".to_string(),
            log_file: std::env::temp_dir().join("kanban.log"),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, the TOML file, and
    /// the saved session token.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &GlobalArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let saved = session_path().and_then(|p| load_token(&p));
        Ok(Self::resolve(cli, &file, saved))
    }

    /// Priority: CLI > file > saved session > default.
    fn resolve(cli: &GlobalArgs, file: &ConfigFile, saved_token: Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli
                .server
                .clone()
                .or_else(|| file.client.server_url.clone())
                .unwrap_or(defaults.server_url),
            token: cli
                .token
                .clone()
                .or_else(|| file.client.token.clone())
                .or(saved_token)
                .filter(|t| !t.trim().is_empty()),
            log_level: cli.log_level.clone(),
            log_file: cli.log_file.clone().unwrap_or(defaults.log_file),
        }
    }
}

// ---------------------------------------------------------------------------
// Saved session
// ---------------------------------------------------------------------------

/// Where `login` keeps the bearer token (`~/.config/kanban/token`).
#[must_use]
pub fn session_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kanban").join("token"))
}

/// Reads a saved token. Missing or empty files yield `None`.
#[must_use]
pub fn load_token(path: &Path) -> Option<String> {
    let token = std::fs::read_to_string(path).ok()?;
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Saves a token for later invocations, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::WriteFile`] if the directory or file cannot be
/// written.
pub fn save_token(path: &Path, token: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(write_err)?;
    }
    std::fs::write(path, token).map_err(write_err)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("kanban").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
