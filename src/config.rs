//! Process-start configuration: directories, config file, server settings.
//!
//! Every server setting resolves in the same order: CLI argument, then
//! environment variable, then `server.json`, then the built-in default.
//! The environment is passed in as a lookup function so resolution can be
//! tested without touching the process environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bridge::DEFAULT_QUEUE_CAPACITY;
use crate::cli::Args;
use crate::server::default_pool_size;

/// Directory name under the platform config/data directories.
pub const APP_DIR: &str = "browse-web";
pub const CONFIG_FILE: &str = "server.json";
pub const LOG_FILE: &str = "browse-web.log";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5678;

pub const ENV_HOST: &str = "BROWSE_WEB_HOST";
pub const ENV_PORT: &str = "BROWSE_WEB_PORT";
pub const ENV_WEB_DIR: &str = "BROWSE_WEB_DIR";
pub const ENV_CONFIG_DIR: &str = "BROWSE_WEB_CONFIG_DIR";

/// Reads the real process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (BROWSE_WEB_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>, env: impl Fn(&str) -> Option<String>) -> Self {
        let config_dir = cli_dir.or_else(|| env(ENV_CONFIG_DIR).map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. BROWSE_WEB_CONFIG_DIR environment variable
/// 3. Local folder IF server.json exists there
/// 4. Platform-specific config directory from dirs-next (default)
///
/// Platform paths:
/// - Linux: ~/.config/browse-web/{name}
/// - macOS: ~/Library/Application Support/browse-web/{name}
/// - Windows: %APPDATA%\browse-web\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs)
///
/// Same priority as [`config_file`], falling back to the platform data
/// directory (`~/.local/share/browse-web` on Linux).
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Ensure that configuration and data directories exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn local_dir() -> Option<PathBuf> {
    let current_dir = std::env::current_dir().ok()?;
    current_dir.join(CONFIG_FILE).is_file().then_some(current_dir)
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = local_dir() {
        return dir;
    }
    dirs_next::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Some(dir) = local_dir() {
        return dir;
    }
    dirs_next::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Contents of `server.json`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub web_dir: Option<PathBuf>,
    pub fixture: Option<PathBuf>,
    pub workers: Option<usize>,
    pub queue: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Loads `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() { Self::load(path) } else { Ok(Self::default()) }
    }
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub web_dir: Option<PathBuf>,
    pub fixture: Option<PathBuf>,
    pub workers: usize,
    pub queue: usize,
    pub inline: bool,
    pub path_config: PathConfig,
}

impl ServerConfig {
    pub fn resolve(args: &Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path_config = PathConfig::from_env_and_cli(args.config_dir.clone(), &env);
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::load_or_default(&config_file(CONFIG_FILE, &path_config))?,
        };

        let env_port = match env(ENV_PORT) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .with_context(|| format!("Invalid {}: {:?}", ENV_PORT, raw))?,
            ),
            None => None,
        };

        Ok(Self {
            host: args
                .host
                .clone()
                .or_else(|| env(ENV_HOST))
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: args.port.or(env_port).or(file.port).unwrap_or(DEFAULT_PORT),
            web_dir: args
                .web_dir
                .clone()
                .or_else(|| env(ENV_WEB_DIR).map(PathBuf::from))
                .or(file.web_dir),
            fixture: args.fixture.clone().or(file.fixture),
            workers: args.workers.or(file.workers).unwrap_or_else(default_pool_size).max(1),
            queue: args.queue.or(file.queue).unwrap_or(DEFAULT_QUEUE_CAPACITY).max(1),
            inline: args.inline,
            path_config,
        })
    }
}
