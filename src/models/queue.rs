// Queue tickets and the reservation helpers around them

use super::user::User;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `step` value of a ticket that has been served
pub const FINISHED_STEP: u8 = 3;

/// Service summary embedded in a queue record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueService {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub room: Value,
}

/// A ticket in the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub id: i64,
    #[serde(default)]
    pub number: i64,
    #[serde(default)]
    pub time: String,
    /// 0..=3, where 3 means finished
    #[serde(default)]
    pub step: u8,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub service: Option<QueueService>,
    #[serde(default)]
    pub client: Option<User>,

    /// Fields we don't model, sent back untouched on update
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Queue {
    pub fn is_active(&self) -> bool {
        self.step != FINISHED_STEP
    }

    pub fn client_name(&self) -> &str {
        self.client.as_ref().map(User::display_name).unwrap_or("")
    }

    pub fn service_name(&self) -> &str {
        self.service.as_ref().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Update body with nested service/client objects replaced by their ids
    pub fn to_update_body(&self) -> Result<Value, serde_json::Error> {
        let mut body = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut body {
            denormalize(map, "service", "service_id");
            denormalize(map, "client", "client_id");
        }
        Ok(body)
    }
}

/// Swap `{key: {id, ...}}` for `{id_key: id}`. Null references are dropped.
fn denormalize(map: &mut Map<String, Value>, key: &str, id_key: &str) {
    match map.remove(key) {
        Some(Value::Object(nested)) => {
            if let Some(id) = nested.get("id") {
                map.insert(id_key.to_string(), id.clone());
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            // Already an id or something we don't understand; leave as-is
            map.insert(key.to_string(), other);
        }
    }
}

/// Payload for reserving a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueue {
    /// YYYY-MM-DD
    pub date: String,
    #[serde(default)]
    pub comment: String,
    pub number: Option<i64>,
    pub time: Option<String>,
    #[serde(default)]
    pub step: u8,
    pub client_id: Option<i64>,
    pub service_id: Option<i64>,
}

/// A free slot returned by the reservables endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableNumber {
    pub queue_number: i64,
    pub time: String,
    pub possible: bool,
}

/// Ticket as shown on the waiting-room board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub queue_id: i64,
    pub number: i64,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Waitlist {
    #[serde(default)]
    pub waiting: Vec<Ticket>,
    #[serde(default)]
    pub meeting: Vec<Ticket>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Queue {
        serde_json::from_value(json!({
            "id": 12,
            "number": 4,
            "time": "09:30",
            "step": 1,
            "created_at": "2025-03-01T09:00:00",
            "comment": "first visit",
            "service": {"id": 2, "name": "Passports", "room": 14},
            "client": {"id": 9, "email": "c@example.com", "fullname": "Cleo"}
        }))
        .unwrap()
    }

    #[test]
    fn test_update_body_replaces_nested_references() {
        let body = sample().to_update_body().unwrap();

        assert_eq!(body["service_id"], 2);
        assert_eq!(body["client_id"], 9);
        assert!(body.get("service").is_none());
        assert!(body.get("client").is_none());
        // Unmodelled fields survive
        assert_eq!(body["comment"], "first visit");
    }

    #[test]
    fn test_update_body_drops_null_references() {
        let mut queue = sample();
        queue.client = None;
        let body = queue.to_update_body().unwrap();
        assert!(body.get("client").is_none());
        assert!(body.get("client_id").is_none());
    }

    #[test]
    fn test_finished_step_is_inactive() {
        let mut queue = sample();
        assert!(queue.is_active());
        queue.step = FINISHED_STEP;
        assert!(!queue.is_active());
    }

    #[test]
    fn test_waitlist_tolerates_missing_lists() {
        let waitlist: Waitlist = serde_json::from_value(json!({"waiting": []})).unwrap();
        assert!(waitlist.meeting.is_empty());
    }
}
