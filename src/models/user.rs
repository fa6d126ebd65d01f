// Identity records: the logged-in user and the clients who take tickets

use serde::{Deserialize, Serialize};

/// Role attached to a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    Client,
    ServiceAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
            Self::ServiceAdmin => "service_admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Person profile behind a user or a walk-in client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    #[serde(default)]
    pub firstname: String,
    // Backend spelling
    #[serde(default)]
    pub surename: String,
    #[serde(default)]
    pub middlename: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Payload for registering a walk-in client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClient {
    pub firstname: String,
    pub surename: String,
    pub middlename: String,
    pub gender: Gender,
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub profile: Option<Client>,
}

impl User {
    /// Name to show for this user, best source first
    pub fn display_name(&self) -> &str {
        if let Some(profile) = &self.profile {
            if !profile.fullname.is_empty() {
                return &profile.fullname;
            }
        }
        if !self.fullname.is_empty() {
            return &self.fullname;
        }
        if !self.username.is_empty() {
            return &self.username;
        }
        &self.email
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_parses_with_missing_optional_fields() {
        let user: User = serde_json::from_value(json!({
            "id": 7,
            "email": "desk@example.com",
            "role": "service_admin"
        }))
        .unwrap();

        assert_eq!(user.role, UserRole::ServiceAdmin);
        assert!(user.profile.is_none());
        assert_eq!(user.display_name(), "desk@example.com");
    }

    #[test]
    fn test_display_name_prefers_profile() {
        let user: User = serde_json::from_value(json!({
            "id": 1,
            "email": "a@b.c",
            "username": "ab",
            "profile": {"id": 3, "fullname": "Ada Byron"}
        }))
        .unwrap();
        assert_eq!(user.display_name(), "Ada Byron");
    }
}
