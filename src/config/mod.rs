//! Configuration for the qdesk client
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/qdesk/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod channel;
mod logging;
mod serialization;
mod session;

#[cfg(test)]
mod tests;

pub use channel::{Backoff, ChannelSettings, FileChannel};
pub use logging::{FileLogging, LogRotation, LoggingConfig};
pub use session::{FileSession, SessionConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name used for the config directory and log file prefix
pub const APP_NAME: &str = "qdesk";

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws";

pub const ENV_API_URL: &str = "QDESK_API_URL";
pub const ENV_WS_URL: &str = "QDESK_WS_URL";

/// Unix-style ~/.config/qdesk on every platform
pub(crate) fn app_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".config").join(APP_NAME))
}

// ─────────────────────────────────────────────────────────────────────────────
// List Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ListConfig {
    /// Rows per page in list views
    pub per_page: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            per_page: crate::resources::DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileList {
    pub per_page: Option<u32>,
}

impl ListConfig {
    pub fn from_file(file: Option<FileList>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            per_page: file
                .per_page
                .filter(|n| *n > 0)
                .unwrap_or(Self::default().per_page),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Config {
    /// REST API base URL
    pub api_base_url: String,

    /// Live notification WebSocket URL
    pub ws_url: String,

    /// Where credentials are kept and how login is scoped
    pub session: SessionConfig,

    /// Reconnect behaviour of the live channel
    pub channel: ChannelSettings,

    pub list: ListConfig,

    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            session: SessionConfig::default(),
            channel: ChannelSettings::default(),
            list: ListConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure; every key is optional
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub api_base_url: Option<String>,
    pub ws_url: Option<String>,

    /// Optional [session] section
    pub session: Option<FileSession>,

    /// Optional [channel] section
    pub channel: Option<FileChannel>,

    /// Optional [list] section
    pub list: Option<FileList>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/qdesk/config.toml
    pub fn config_path() -> Option<PathBuf> {
        app_config_dir().map(|p| p.join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist.
    /// Failures are ignored; the file is only a convenience.
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };
        if path.exists() {
            return;
        }
        if let Err(e) = Self::default().write_to(&path) {
            tracing::debug!(path = %path.display(), "Could not create config template: {:#}", e);
        }
    }

    /// Write this config as a commented TOML file, creating parent directories
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_toml())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Load the config file if present. A file that exists but doesn't parse
    /// is an error: silently falling back to defaults hides typos.
    fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
        let Some(path) = path else {
            return Ok(FileConfig::default());
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => Err(e).with_context(|| format!("Cannot read config file {}", path.display())),
        }
    }

    /// Load configuration: env vars > file > defaults
    pub fn from_env() -> Result<Self> {
        let file = Self::load_file_config(Self::config_path().as_deref())?;
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    /// Load from an explicit file instead of the default location
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = Self::load_file_config(Some(path))?;
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file with an environment lookup
    pub(crate) fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let api_base_url = env(ENV_API_URL)
            .filter(|v| !v.is_empty())
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let ws_url = env(ENV_WS_URL)
            .filter(|v| !v.is_empty())
            .or(file.ws_url)
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());

        Self {
            api_base_url,
            ws_url,
            session: SessionConfig::from_file(file.session),
            channel: ChannelSettings::from_file(file.channel),
            list: ListConfig::from_file(file.list),
            logging: LoggingConfig::from_file(file.logging),
        }
    }
}
