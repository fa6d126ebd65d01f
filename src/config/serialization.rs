//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;
use std::path::Path;

/// TOML basic string with escaping
fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

fn quoted_path(p: &Path) -> String {
    quoted(&p.to_string_lossy())
}

impl Config {
    /// Serialize to a commented TOML document the loader reads back
    pub fn to_toml(&self) -> String {
        format!(
            r#"# qdesk configuration
#
# Environment variables override this file:
#   QDESK_API_URL  -> api_base_url
#   QDESK_WS_URL   -> ws_url
#   RUST_LOG       -> [logging] level

# REST API base URL
api_base_url = {api}

# Live notification WebSocket
ws_url = {ws}

# Credential storage
[session]
# "Remember me" logins are written here and survive restarts
persistent_dir = {persistent_dir}
# Other logins are written here (per boot)
session_dir = {session_dir}
login_scope = {login_scope}

# Live channel reconnects
[channel]
reconnect_interval_ms = {reconnect_ms}
backoff = {backoff}  # fixed, exponential
max_reconnect_interval_ms = {max_reconnect_ms}

# List views
[list]
per_page = {per_page}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = {log_level}
# JSON file logging in addition to stderr
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = {log_file_rotation}  # hourly, daily, never
file_prefix = {log_file_prefix}
"#,
            api = quoted(&self.api_base_url),
            ws = quoted(&self.ws_url),
            persistent_dir = quoted_path(&self.session.persistent_dir),
            session_dir = quoted_path(&self.session.session_dir),
            login_scope = quoted(&self.session.login_scope),
            reconnect_ms = self.channel.reconnect_interval_ms,
            backoff = quoted(self.channel.backoff.as_str()),
            max_reconnect_ms = self.channel.max_reconnect_interval_ms,
            per_page = self.list.per_page,
            log_level = quoted(&self.logging.level),
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = quoted_path(&self.logging.file_dir),
            log_file_rotation = quoted(self.logging.file_rotation.as_str()),
            log_file_prefix = quoted(&self.logging.file_prefix),
        )
    }
}
