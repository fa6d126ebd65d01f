// Session coordinator: login, logout, restore, identity refresh
//
// Owns nothing the gateway doesn't already share: both hold the same
// `SessionState`. The coordinator adds the flows that talk to the auth
// endpoints and decide which durable scope a credential goes into.

mod state;
pub mod storage;

pub use state::{SessionState, StorageScope};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

use crate::api::{payload, Gateway, RequestBody};
use crate::error::ClientError;
use crate::events::SessionEvent;
use crate::models::{Client, NewClient, User};
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Scope string sent with the password grant
pub const DEFAULT_LOGIN_SCOPE: &str = "me items";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

pub struct Coordinator {
    gateway: Gateway,
    state: Arc<SessionState>,
    login_scope: String,
}

impl Coordinator {
    pub fn new(gateway: Gateway) -> Self {
        let state = gateway.session().clone();
        Self {
            gateway,
            state,
            login_scope: DEFAULT_LOGIN_SCOPE.to_string(),
        }
    }

    pub fn with_login_scope(mut self, scope: impl Into<String>) -> Self {
        self.login_scope = scope.into();
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.identity()
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Password login. `remember` picks persistent over session-scoped storage.
    /// Any failure leaves the previous session untouched.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<User, ClientError> {
        let form = vec![
            ("username".to_string(), email.to_string()),
            ("password".to_string(), password.to_string()),
            ("scope".to_string(), self.login_scope.clone()),
        ];

        let response = self
            .gateway
            .request_anonymous(
                Method::POST,
                &self.gateway.endpoints().login(),
                RequestBody::Form(form),
            )
            .await?;

        if !response.is_success() {
            let msg = payload::error_message(&response.body)
                .unwrap_or_else(|| "Login failed".to_string());
            tracing::warn!(email, status = response.status, "Login rejected: {}", msg);
            return Err(ClientError::Auth(msg));
        }

        let token_response: TokenResponse = serde_json::from_value(response.body)
            .map_err(|e| ClientError::Auth(format!("Login failed: malformed response ({})", e)))?;

        let token = token_response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ClientError::Auth("Login failed: no access token".to_string()))?;

        let user = match token_response.user {
            Some(user) => user,
            None => self.lookup_identity(&token).await.map_err(|e| {
                ClientError::Auth(format!("Login failed: {}", e.message()))
            })?,
        };

        let scope = if remember {
            StorageScope::Persistent
        } else {
            StorageScope::Session
        };
        self.state.establish(&token, Some(user.clone()), scope);

        tracing::info!(email, ?scope, "Logged in");
        self.gateway.events().emit(SessionEvent::LoggedIn {
            timestamp: Utc::now(),
            email: email.to_string(),
            remember,
        });

        Ok(user)
    }

    /// Clear credential, identity and both storage scopes. No-op when logged out.
    pub fn logout(&self) {
        if self.state.clear() {
            tracing::info!("Credentials were cleared");
            self.gateway.events().emit(SessionEvent::LoggedOut {
                timestamp: Utc::now(),
            });
        }
    }

    /// Called once at startup. Returns whether a credential was found.
    pub fn restore_from_storage(&self) -> bool {
        match self.state.restore() {
            Some(scope) => {
                tracing::debug!(?scope, "Session restored from storage");
                true
            }
            None => {
                tracing::debug!("No stored session");
                false
            }
        }
    }

    /// Refresh the identity from `/me`. A failure leaves the credential alone,
    /// except for 401 which the gateway has already handled.
    pub async fn fetch_current_user(&self) -> Result<User, ClientError> {
        let body = self
            .gateway
            .get(&self.gateway.endpoints().me())
            .await?
            .into_result()?;

        let user = parse_user(body)?;
        self.state.set_identity(user.clone());
        Ok(user)
    }

    /// Register a new account. Does not log in.
    pub async fn signup(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .gateway
            .request_anonymous(
                Method::POST,
                &self.gateway.endpoints().register(),
                RequestBody::Json(body),
            )
            .await?;

        parse_user(response.into_result()?)
    }

    /// Register a walk-in client on behalf of the logged-in operator
    pub async fn add_client(&self, client: &NewClient) -> Result<Client, ClientError> {
        let body = self
            .gateway
            .send_json(Method::POST, &self.gateway.endpoints().client(), client)
            .await?
            .into_result()?;

        serde_json::from_value(body).map_err(ClientError::from)
    }

    async fn lookup_identity(&self, token: &str) -> Result<User, ClientError> {
        let body = self
            .gateway
            .request_with_token(
                token,
                Method::GET,
                &self.gateway.endpoints().me(),
                RequestBody::Empty,
            )
            .await?
            .into_result()?;
        parse_user(body)
    }
}

/// Accept both `{"user": {...}}` and a bare user object
fn parse_user(body: Value) -> Result<User, ClientError> {
    let user = match body {
        Value::Object(mut map) if map.get("user").is_some_and(Value::is_object) => map
            .remove("user")
            .unwrap_or(Value::Null),
        other => other,
    };
    serde_json::from_value(user).map_err(ClientError::from)
}
