//! Remote resource gateway
//!
//! Every authenticated call goes through [`Gateway::request`], which:
//! 1. reads the credential from [`SessionState`] at call time
//! 2. attaches `Accept`, `Content-Type` and `Authorization: Bearer` headers
//! 3. on HTTP 401 clears the session and broadcasts
//!    [`SessionEvent::Unauthorized`] *before* handing the body back
//!
//! The parsed body is returned even for error statuses; callers decide what
//! an `error`/`detail` payload means for them (see [`ApiResponse::into_result`]).

pub mod endpoints;
pub mod payload;
pub mod transport;

pub use endpoints::Endpoints;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, RequestBody, Transport};

use crate::error::ClientError;
use crate::events::{EventBus, SessionEvent};
use crate::session::SessionState;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const UNAUTHORIZED: u16 = 401;

/// Decoded response: status plus JSON body (`null` for an empty body)
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == UNAUTHORIZED
    }

    /// Body on success, typed error otherwise
    pub fn into_result(self) -> Result<Value, ClientError> {
        let message = payload::error_message(&self.body);

        if self.is_unauthorized() {
            return Err(ClientError::Auth(
                message.unwrap_or_else(|| "Session expired".to_string()),
            ));
        }
        if let Some(msg) = message {
            return Err(ClientError::Validation(msg));
        }
        if !self.is_success() {
            return Err(ClientError::Validation(format!(
                "Request failed with status {}",
                self.status
            )));
        }
        Ok(self.body)
    }
}

/// How a request is authenticated
#[derive(Debug, Clone)]
enum Credentials {
    /// Current session credential; 401 expires the session
    Session,
    /// Explicit token (e.g. identity lookup during login); no expiry side effect
    Token(String),
    /// No Authorization header (login, signup)
    Anonymous,
}

/// HTTP gateway shared by the session coordinator and resource stores
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    session: Arc<SessionState>,
    events: EventBus,
}

impl Gateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
        session: Arc<SessionState>,
        events: EventBus,
    ) -> Self {
        Self {
            transport,
            endpoints,
            session,
            events,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Authenticated request with the session credential
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<ApiResponse, ClientError> {
        self.dispatch(Credentials::Session, method, url, body).await
    }

    pub async fn get(&self, url: &str) -> Result<ApiResponse, ClientError> {
        self.request(Method::GET, url, RequestBody::Empty).await
    }

    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &T,
    ) -> Result<ApiResponse, ClientError> {
        let json = serde_json::to_value(body)?;
        self.request(method, url, RequestBody::Json(json)).await
    }

    pub async fn delete(&self, url: &str) -> Result<ApiResponse, ClientError> {
        self.request(Method::DELETE, url, RequestBody::Empty).await
    }

    /// Request authenticated with an explicit token instead of the session's
    pub async fn request_with_token(
        &self,
        token: &str,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<ApiResponse, ClientError> {
        self.dispatch(Credentials::Token(token.to_string()), method, url, body)
            .await
    }

    /// Request without an Authorization header
    pub async fn request_anonymous(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<ApiResponse, ClientError> {
        self.dispatch(Credentials::Anonymous, method, url, body).await
    }

    /// Upload an avatar image; returns the server's JSON (usually the stored path)
    pub async fn upload_avatar(&self, file_name: &str, bytes: Vec<u8>) -> Result<Value, ClientError> {
        let body = RequestBody::Multipart {
            field: "file".to_string(),
            file_name: file_name.to_string(),
            bytes,
        };
        self.request(Method::POST, &self.endpoints.avatars(), body)
            .await?
            .into_result()
    }

    async fn dispatch(
        &self,
        credentials: Credentials,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<ApiResponse, ClientError> {
        let mut request = HttpRequest::new(method, url).header("Accept", "application/json");

        // Form and multipart bodies carry their own content type
        if matches!(body, RequestBody::Empty | RequestBody::Json(_)) {
            request = request.header("Content-Type", "application/json");
        }

        let token = match &credentials {
            // Read at call time: a logout that lands mid-flight affects the next call only
            Credentials::Session => Some(self.session.credential()),
            Credentials::Token(token) => Some(token.clone()),
            Credentials::Anonymous => None,
        };
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let method_name = request.method.clone();
        tracing::debug!(method = %method_name, url, "Sending request");

        let response = self.transport.execute(request.body(body)).await?;

        if response.status == UNAUTHORIZED && matches!(credentials, Credentials::Session) {
            self.expire_session(url);
        }

        let body = parse_body(&response.body).map_err(|e| {
            tracing::error!(method = %method_name, url, status = response.status, "{}", e);
            e
        })?;

        Ok(ApiResponse {
            status: response.status,
            body,
        })
    }

    fn expire_session(&self, url: &str) {
        if self.session.clear() {
            tracing::warn!(url, "Request unauthorized, credentials were cleared");
        } else {
            tracing::debug!(url, "Request unauthorized while logged out");
        }
        self.events.emit(SessionEvent::unauthorized(url));
    }
}

fn parse_body(text: &str) -> Result<Value, ClientError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(ClientError::from)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::session::StorageScope;
    use serde_json::json;

    #[tokio::test]
    async fn test_request_attaches_current_credential() {
        let transport = FakeTransport::new();
        transport.push(200, json!([]));
        let gateway = gateway(transport.clone());
        gateway
            .session()
            .establish("abc", None, StorageScope::Persistent);

        gateway.get(&gateway.endpoints().queues()).await.unwrap();

        let sent = transport.last();
        assert_eq!(sent.header_value("authorization"), Some("Bearer abc"));
        assert_eq!(sent.header_value("accept"), Some("application/json"));
        assert_eq!(sent.header_value("content-type"), Some("application/json"));
        assert_eq!(sent.url, "http://api.test/queue");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_session_and_broadcasts_once() {
        let transport = FakeTransport::new();
        transport.push(401, json!({"detail": "Could not validate credentials"}));
        let gateway = gateway(transport.clone());
        gateway
            .session()
            .establish("abc", None, StorageScope::Persistent);
        let mut events = gateway.events().subscribe();

        // The caller still gets the body back, not an error
        let response = gateway.get(&gateway.endpoints().queues()).await.unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.body["detail"], "Could not validate credentials");
        assert_eq!(gateway.session().credential(), "");
        assert!(!gateway.session().is_authenticated());

        let event = events.try_recv().unwrap();
        assert!(event.is_unauthorized());
        assert!(events.try_recv().is_err(), "exactly one broadcast");
    }

    #[tokio::test]
    async fn test_next_call_uses_cleared_credential() {
        let transport = FakeTransport::new();
        transport.push(401, json!({"detail": "expired"}));
        transport.push(200, json!([]));
        let gateway = gateway(transport.clone());
        gateway
            .session()
            .establish("abc", None, StorageScope::Session);

        gateway.get(&gateway.endpoints().queues()).await.unwrap();
        gateway.get(&gateway.endpoints().queues()).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].header_value("authorization"), Some("Bearer abc"));
        assert_eq!(requests[1].header_value("authorization"), None);
    }

    #[tokio::test]
    async fn test_explicit_token_401_does_not_expire_session() {
        let transport = FakeTransport::new();
        transport.push(401, json!({"detail": "bad token"}));
        let gateway = gateway(transport.clone());
        gateway
            .session()
            .establish("keep-me", None, StorageScope::Persistent);

        gateway
            .request_with_token("other", Method::GET, "http://api.test/me", RequestBody::Empty)
            .await
            .unwrap();

        assert_eq!(gateway.session().credential(), "keep-me");
    }

    #[tokio::test]
    async fn test_invalid_json_is_transport_error() {
        let transport = FakeTransport::new();
        transport.push_raw(200, "<html>gateway timeout</html>");
        let gateway = gateway(transport);

        let result = gateway.get("http://api.test/queue").await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[tokio::test]
    async fn test_empty_body_parses_as_null() {
        let transport = FakeTransport::new();
        transport.push_raw(204, "");
        let gateway = gateway(transport);

        let response = gateway.delete("http://api.test/queue/1").await.unwrap();
        assert_eq!(response.body, Value::Null);
    }

    #[tokio::test]
    async fn test_form_body_skips_json_content_type() {
        let transport = FakeTransport::new();
        transport.push(200, json!({"access_token": "t"}));
        let gateway = gateway(transport.clone());

        gateway
            .request_anonymous(
                Method::POST,
                "http://api.test/token",
                RequestBody::Form(vec![("username".into(), "a".into())]),
            )
            .await
            .unwrap();

        let sent = transport.last();
        assert_eq!(sent.header_value("content-type"), None);
        assert_eq!(sent.header_value("authorization"), None);
    }

    #[test]
    fn test_into_result_classification() {
        let auth = ApiResponse {
            status: 401,
            body: json!({"detail": "expired"}),
        };
        assert_eq!(auth.into_result(), Err(ClientError::Auth("expired".into())));

        let declared = ApiResponse {
            status: 200,
            body: json!({"error": "Room is closed"}),
        };
        assert_eq!(
            declared.into_result(),
            Err(ClientError::Validation("Room is closed".into()))
        );

        let bare = ApiResponse {
            status: 500,
            body: Value::Null,
        };
        assert!(matches!(bare.into_result(), Err(ClientError::Validation(_))));

        let ok = ApiResponse {
            status: 201,
            body: json!({"id": 1}),
        };
        assert_eq!(ok.into_result(), Ok(json!({"id": 1})));
    }
}
