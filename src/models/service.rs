use serde::{Deserialize, Serialize};

/// A bookable service desk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub available_days: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub from_time: String,
    #[serde(default)]
    pub to_time: String,
    #[serde(default)]
    pub avg_minute: i64,
    #[serde(default)]
    pub image_url: String,
}

/// Payload for creating a service (the server assigns the id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewService {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub available_days: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub from_time: String,
    #[serde(default)]
    pub to_time: String,
    #[serde(default)]
    pub avg_minute: i64,
}
