//! Configuration system for the `tasksync` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tasksync/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use tasksync_proto::{ListId, TaskId, TaskStatus, UserId};

use crate::sync::SyncConfig;

/// Errors that can occur when loading configuration.
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

    /// A period or timeout was configured as zero.
    #[error("{key} must be greater than zero")]
    ZeroDuration {
        /// Offending config key.
        key: &'static str,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    sync: SyncFileConfig,
    storage: StorageFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    interval_secs: Option<u64>,
    probe_interval_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    data_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL, e.g. `http://localhost:1337/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Period of the background refresh while synced.
    pub sync_interval: Duration,
    /// Period of the reachability probe.
    pub probe_interval: Duration,
    /// Timeout of one reachability probe.
    pub probe_timeout: Duration,
    /// Directory holding the credential store and the cache.
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1337/api".to_string(),
            request_timeout: Duration::from_secs(10),
            sync_interval: Duration::from_secs(300),
            probe_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            data_dir: default_data_dir(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/tasksync/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if it sets a period or timeout to zero.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            base_url: cli
                .base_url
                .clone()
                .or_else(|| file.server.base_url.clone())
                .unwrap_or(defaults.base_url),
            request_timeout: file
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            sync_interval: file
                .sync
                .interval_secs
                .map_or(defaults.sync_interval, Duration::from_secs),
            probe_interval: file
                .sync
                .probe_interval_secs
                .map_or(defaults.probe_interval, Duration::from_secs),
            probe_timeout: file
                .sync
                .probe_timeout_secs
                .map_or(defaults.probe_timeout, Duration::from_secs),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.storage.data_dir.clone())
                .unwrap_or(defaults.data_dir),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("server.request_timeout_secs", self.request_timeout),
            ("sync.interval_secs", self.sync_interval),
            ("sync.probe_interval_secs", self.probe_interval),
            ("sync.probe_timeout_secs", self.probe_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { key });
            }
        }
        Ok(())
    }

    /// Orchestrator settings derived from this configuration.
    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: self.sync_interval,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Task lists that keep working offline")]
pub struct CliArgs {
    /// REST base URL of the backend.
    #[arg(long, env = "TASKSYNC_BASE_URL")]
    pub base_url: Option<String>,

    /// Directory for credentials and cached data.
    #[arg(long, env = "TASKSYNC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to config file (default: `~/.config/tasksync/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKSYNC_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tasksync.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do (default: `status`).
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands of the `tasksync` binary.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sign in with a username or e-mail address.
    Login {
        /// Username or e-mail.
        identifier: String,
        /// Password.
        #[arg(long, env = "TASKSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in.
    Register {
        /// Username.
        username: String,
        /// E-mail address.
        email: String,
        /// Password.
        #[arg(long, env = "TASKSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored credentials.
    Logout,
    /// Show the signed-in user as the backend sees it.
    Whoami,
    /// Request a password reset code.
    ForgotPassword {
        /// Account e-mail address.
        email: String,
    },
    /// Set a new password with a reset code.
    ResetPassword {
        /// Reset code.
        code: String,
        /// New password.
        #[arg(long)]
        password: String,
        /// New password again.
        #[arg(long)]
        confirm: String,
    },
    /// Show task lists (cached when offline).
    Lists,
    /// Show the tasks of a list (cached when offline).
    Tasks {
        /// List id.
        list: ListId,
        /// Only tasks in this status (pending, in_progress, completed).
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Show tasks assigned to a user across accessible lists.
    Assigned {
        /// User id.
        user: UserId,
    },
    /// Refresh lists and tasks from the backend.
    Sync,
    /// Create a task list.
    CreateList {
        /// Title.
        title: String,
        /// Description.
        #[arg(long, default_value = "")]
        description: String,
        /// Make the list public.
        #[arg(long)]
        public: bool,
    },
    /// Change a task list.
    UpdateList {
        /// List id.
        list: ListId,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New visibility.
        #[arg(long)]
        public: Option<bool>,
    },
    /// Delete a task list and its tasks.
    DeleteList {
        /// List id.
        list: ListId,
    },
    /// Share a list with a user.
    Share {
        /// List id.
        list: ListId,
        /// User id.
        user: UserId,
    },
    /// Stop sharing a list with a user.
    Unshare {
        /// List id.
        list: ListId,
        /// User id.
        user: UserId,
    },
    /// Create a task.
    AddTask {
        /// List id.
        list: ListId,
        /// Title.
        title: String,
        /// Description.
        #[arg(long)]
        description: Option<String>,
        /// Estimate in minutes.
        #[arg(long, default_value_t = 0)]
        estimate: u32,
        /// Assignee user id.
        #[arg(long)]
        assign: Option<UserId>,
        /// Due date (RFC 3339).
        #[arg(long)]
        due: Option<DateTime<Utc>>,
    },
    /// Move a task to another status.
    SetStatus {
        /// Task id.
        task: TaskId,
        /// New status (pending, in_progress, completed).
        status: TaskStatus,
    },
    /// Delete a task.
    DeleteTask {
        /// Task id.
        task: TaskId,
    },
    /// Show connectivity and sync status.
    Status,
    /// Remove cached lists and tasks (credentials are kept).
    ClearCache,
    /// Stay running, syncing on reconnect and periodically.
    Watch,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tasksync")
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("tasksync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
