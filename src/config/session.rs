//! Session storage locations and login scope

use serde::Deserialize;
use std::path::PathBuf;

use super::{app_config_dir, APP_NAME};
use crate::session::DEFAULT_LOGIN_SCOPE;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Holds "remember me" credentials; survives reboots
    pub persistent_dir: PathBuf,
    /// Holds per-boot credentials; the runtime dir is wiped on logout/reboot
    pub session_dir: PathBuf,
    /// `scope` sent with the password grant
    pub login_scope: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persistent_dir: app_config_dir().unwrap_or_else(|| PathBuf::from(".qdesk")),
            session_dir: dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_NAME),
            login_scope: DEFAULT_LOGIN_SCOPE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSession {
    pub persistent_dir: Option<String>,
    pub session_dir: Option<String>,
    pub login_scope: Option<String>,
}

impl SessionConfig {
    pub fn from_file(file: Option<FileSession>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            persistent_dir: file
                .persistent_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.persistent_dir),
            session_dir: file
                .session_dir
                .map(PathBuf::from)
                .unwrap_or(defaults.session_dir),
            login_scope: file.login_scope.unwrap_or(defaults.login_scope),
        }
    }
}
