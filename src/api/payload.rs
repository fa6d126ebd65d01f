//! Interpreting response bodies
//!
//! The backend reports failures in two shapes: a plain `{"error": "..."}`
//! or the framework-style `{"detail": ...}` where detail is either a string
//! or a list of `{"msg": "..."}` objects. Both can arrive on a 2xx.

use crate::error::GENERIC_FAILURE;
use serde_json::Value;

/// Extract the server's failure message, if the body carries one
pub fn error_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;

    if let Some(error) = obj.get("error") {
        match error {
            Value::String(s) if !s.is_empty() => return Some(s.clone()),
            Value::Null | Value::Bool(false) => {}
            Value::String(_) => return Some(GENERIC_FAILURE.to_string()),
            other => return Some(other.to_string()),
        }
    }

    match obj.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|d| d.get("msg").and_then(Value::as_str))
                .collect();
            if msgs.is_empty() {
                None
            } else {
                Some(msgs.join(", "))
            }
        }
        _ => None,
    }
}

/// JSON truthiness, used for delete acknowledgements
pub fn is_truthy(body: &Value) -> bool {
    match body {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
