//! Configuration for the `TodoSync` client.
//!
//! Layered with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/todosync/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is not an error. An explicit `--config`
//! path that doesn't exist is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use todosync_proto::ListId;

use crate::api::ApiConfig;
use crate::channel::{ChannelConfig, ReconnectPolicy};

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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    auth: AuthFileConfig,
    channel: ChannelFileConfig,
    api: ApiFileConfig,
    session: SessionFileConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    api_url: Option<String>,
    ws_url: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthFileConfig {
    token: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChannelFileConfig {
    reconnect_base_delay_ms: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    page_size_lists: Option<u32>,
    page_size_tasks: Option<u32>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    list_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Server --
    /// REST base URL including the API prefix.
    pub api_url: String,
    /// Push channel base URL; the list id is appended per connection.
    pub ws_url: String,

    // -- Auth --
    /// Bearer token. Takes precedence over `email`/`password`.
    pub token: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,

    // -- Channel --
    /// Reconnect attempt `n` waits `n` times this.
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub connect_timeout: Duration,

    // -- API --
    pub list_page_size: u32,
    pub task_page_size: u32,

    // -- Session --
    /// List to follow. `None` follows the first list.
    pub list_id: Option<ListId>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api/v1".to_string(),
            ws_url: "ws://localhost:8000/ws".to_string(),
            token: None,
            email: None,
            password: None,
            reconnect_base_delay: Duration::from_millis(2000),
            max_reconnect_attempts: 5,
            connect_timeout: Duration::from_secs(10),
            list_page_size: 50,
            task_page_size: 100,
            list_id: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// or if any config file present cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.server.api_url.clone())
                .unwrap_or(defaults.api_url),
            ws_url: cli
                .ws_url
                .clone()
                .or_else(|| file.server.ws_url.clone())
                .unwrap_or(defaults.ws_url),
            token: cli.token.clone().or_else(|| file.auth.token.clone()),
            email: cli.email.clone().or_else(|| file.auth.email.clone()),
            password: cli.password.clone().or_else(|| file.auth.password.clone()),
            reconnect_base_delay: file
                .channel
                .reconnect_base_delay_ms
                .map_or(defaults.reconnect_base_delay, Duration::from_millis),
            max_reconnect_attempts: file
                .channel
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            connect_timeout: file
                .channel
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            list_page_size: file
                .api
                .page_size_lists
                .unwrap_or(defaults.list_page_size),
            task_page_size: file
                .api
                .page_size_tasks
                .unwrap_or(defaults.task_page_size),
            list_id: cli.list.or(file.session.list_id).map(ListId),
        }
    }

    /// Settings for the push channel manager.
    #[must_use]
    pub fn to_channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            ws_url: self.ws_url.clone(),
            reconnect: ReconnectPolicy {
                base_delay: self.reconnect_base_delay,
                max_attempts: self.max_reconnect_attempts,
            },
            connect_timeout: self.connect_timeout,
        }
    }

    /// Settings for the REST client.
    #[must_use]
    pub fn to_api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_url.clone(),
            list_page_size: self.list_page_size,
            task_page_size: self.task_page_size,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Follow a shared todo list and log every change")]
pub struct CliArgs {
    /// REST base URL, e.g. `http://localhost:8000/api/v1`.
    #[arg(long, env = "TODOSYNC_API_URL")]
    pub api_url: Option<String>,

    /// Push channel base URL, e.g. `ws://localhost:8000/ws`.
    #[arg(long, env = "TODOSYNC_WS_URL")]
    pub ws_url: Option<String>,

    /// Bearer token. Skips login when set.
    #[arg(long, env = "TODOSYNC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Account email for login.
    #[arg(long, env = "TODOSYNC_EMAIL")]
    pub email: Option<String>,

    /// Account password for login.
    #[arg(long, env = "TODOSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Id of the list to follow (default: the first list).
    #[arg(long)]
    pub list: Option<i64>,

    /// Path to config file (default: `~/.config/todosync/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TODOSYNC_LOG")]
    pub log_level: String,

    /// Path to log file (default: stderr).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Load and parse a TOML config file.
///
/// An explicit path must exist. Without one, the default path is tried and a
/// missing file is treated as empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
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
        config_dir.join("todosync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
