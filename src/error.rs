//! Client error taxonomy
//!
//! Every request-path failure the core can produce lands in [`ClientError`].
//! Socket failures on the live channel have their own type
//! ([`crate::channel::ChannelError`]) because they never reach a caller.

use std::fmt;

/// Message shown when the server gave us nothing better
pub const GENERIC_FAILURE: &str = "Something went wrong";

/// Errors surfaced by the gateway, session coordinator and resource stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network failure, or a body that was not valid JSON
    Transport(String),
    /// Credential rejected (HTTP 401) or login refused
    Auth(String),
    /// Server-declared `error`/`detail` payload
    Validation(String),
}

impl ClientError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// User-visible text: the server's message when there was one,
    /// otherwise a generic failure string
    pub fn message(&self) -> &str {
        let msg = match self {
            Self::Transport(m) | Self::Auth(m) | Self::Validation(m) => m.as_str(),
        };
        if msg.trim().is_empty() {
            GENERIC_FAILURE
        } else {
            msg
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(_) => write!(f, "Transport error: {}", self.message()),
            Self::Auth(_) => write!(f, "Authentication error: {}", self.message()),
            Self::Validation(_) => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Transport(format!("Invalid JSON: {}", e))
    }
}
