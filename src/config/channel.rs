//! Live channel reconnect settings

use serde::Deserialize;
use std::time::Duration;

use crate::channel::{ReconnectPolicy, DEFAULT_MAX_RECONNECT_INTERVAL, DEFAULT_RECONNECT_INTERVAL};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every close
    #[default]
    Fixed,
    /// Doubling delay, capped at `max_reconnect_interval_ms`
    Exponential,
}

impl Backoff {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fixed" => Some(Self::Fixed),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub reconnect_interval_ms: u64,
    pub backoff: Backoff,
    pub max_reconnect_interval_ms: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL.as_millis() as u64,
            backoff: Backoff::Fixed,
            max_reconnect_interval_ms: DEFAULT_MAX_RECONNECT_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileChannel {
    pub reconnect_interval_ms: Option<u64>,
    pub backoff: Option<String>,
    pub max_reconnect_interval_ms: Option<u64>,
}

impl ChannelSettings {
    pub fn from_file(file: Option<FileChannel>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let backoff = match file.backoff.as_deref() {
            None => defaults.backoff,
            Some(s) => Backoff::parse(s).unwrap_or_else(|| {
                tracing::warn!(value = s, "Unknown channel backoff, using fixed");
                Backoff::Fixed
            }),
        };

        Self {
            reconnect_interval_ms: file
                .reconnect_interval_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.reconnect_interval_ms),
            backoff,
            max_reconnect_interval_ms: file
                .max_reconnect_interval_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.max_reconnect_interval_ms),
        }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        let initial = Duration::from_millis(self.reconnect_interval_ms);
        match self.backoff {
            Backoff::Fixed => ReconnectPolicy::Fixed(initial),
            Backoff::Exponential => ReconnectPolicy::Exponential {
                initial,
                max: Duration::from_millis(self.max_reconnect_interval_ms).max(initial),
            },
        }
    }
}
