// Session events broadcast to whoever is watching
//
// The gateway raises `Unauthorized` when any request comes back 401, after the
// session has already been cleared. Consumers (the CLI, a future UI) subscribe
// and decide what to show; nothing in the core waits on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Buffer for slow subscribers; older events are dropped for laggards
const EVENT_BUFFER: usize = 64;

/// Events raised by the session layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A request was rejected with 401 and the session was force-cleared
    Unauthorized {
        timestamp: DateTime<Utc>,
        url: String,
    },

    /// Credential stored after a successful login
    LoggedIn {
        timestamp: DateTime<Utc>,
        email: String,
        remember: bool,
    },

    /// Explicit logout (not raised for forced expiry)
    LoggedOut { timestamp: DateTime<Utc> },
}

impl SessionEvent {
    pub fn unauthorized(url: impl Into<String>) -> Self {
        Self::Unauthorized {
            timestamp: Utc::now(),
            url: url.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Cloneable handle for publishing and subscribing to session events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Session event dropped (no subscribers)");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(SessionEvent::unauthorized("http://api/queue"));

        let event = rx.recv().await.unwrap();
        assert!(event.is_unauthorized());
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.emit(SessionEvent::LoggedOut {
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SessionEvent::unauthorized("http://api/me");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "unauthorized");
        assert_eq!(json["url"], "http://api/me");
    }
}
