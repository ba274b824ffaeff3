use crate::core::refresh::{Admission, RefreshCoordinator, RefreshOutcome, SessionError};
use crate::models::{AvatarUpload, Credentials, ErrorBody, RefreshResponse, RefreshTokenRequest};
use crate::services::credentials::CredentialStore;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Errors that can occur when sending a request through the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Session expired: {0}")]
    SessionExpired(#[from] SessionError),

    #[error("Failed to build request: {0}")]
    Encode(String),
}

/// Body of an outbound request
///
/// Kept as plain data so a request can be rebuilt for its single retry.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Avatar(AvatarUpload),
}

/// Description of one logical request
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
    refresh_on_unauthorized: bool,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            refresh_on_unauthorized: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, GatewayError> {
        let value = serde_json::to_value(body).map_err(|e| GatewayError::Encode(e.to_string()))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn avatar(mut self, upload: AvatarUpload) -> Self {
        self.body = Some(RequestBody::Avatar(upload));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// A 401 on this request is returned as-is instead of starting a refresh.
    /// Used for the sign-in endpoints, where 401 means bad credentials.
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Status and body of a completed request
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Human-readable message from an error body, if the backend sent one
    pub fn error_message(&self) -> Option<String> {
        serde_json::from_str::<ErrorBody>(&self.body)
            .ok()
            .and_then(|b| b.text())
            .or_else(|| {
                let text = self.body.trim();
                (!text.is_empty() && !text.starts_with('{')).then(|| text.to_string())
            })
    }
}

struct GatewayInner {
    base_url: String,
    client: Client,
    store: Arc<dyn CredentialStore>,
    coordinator: Mutex<RefreshCoordinator>,
}

/// Authenticated request gateway
///
/// Attaches the bearer token to every request and recovers from token
/// expiry with a single-flight refresh:
/// - the first 401 starts one refresh cycle on a background task
/// - further 401s while it runs park in a FIFO queue
/// - when the cycle settles every parked request gets the same outcome and
///   retries once with the new token, or fails with the same error
///
/// Cloning is cheap; all clones share the session state.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Create a new gateway
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            inner: Arc::new(GatewayInner {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                client,
                store,
                coordinator: Mutex::new(RefreshCoordinator::new()),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path.trim_start_matches('/'))
    }

    fn coordinator(&self) -> MutexGuard<'_, RefreshCoordinator> {
        // state stays consistent even if a holder panicked; nothing awaits under this lock
        self.inner
            .coordinator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_refreshing(&self) -> bool {
        self.coordinator().is_refreshing()
    }

    /// Requests currently parked on a running refresh
    pub fn pending_requests(&self) -> usize {
        self.coordinator().pending()
    }

    async fn credentials(&self) -> Option<Credentials> {
        match self.inner.store.load().await {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!("Failed to read credentials, continuing unauthenticated: {}", e);
                None
            }
        }
    }

    /// Current access token, read through the gateway
    pub async fn access_token(&self) -> Option<String> {
        self.credentials()
            .await
            .map(|c| c.access_token)
            .filter(|t| !t.is_empty())
    }

    pub async fn has_session(&self) -> bool {
        self.access_token().await.is_some()
    }

    /// Install tokens obtained from sign-in or sign-up
    pub async fn install_session(&self, credentials: Credentials) {
        if let Err(e) = self.inner.store.store(&credentials).await {
            tracing::warn!("Failed to persist new session: {}", e);
        }
        self.coordinator()
            .session_changed(Ok(credentials.access_token.clone()));
        tracing::info!("Session installed");
    }

    /// Drop the session (sign-out)
    pub async fn end_session(&self) {
        self.clear_credentials().await;
        self.coordinator().session_changed(Err(SessionError::SignedOut));
        tracing::info!("Session ended");
    }

    async fn clear_credentials(&self) {
        if let Err(e) = self.inner.store.clear().await {
            tracing::warn!("Failed to clear credentials: {}", e);
        }
    }

    /// Send a request, refreshing the session once on 401
    pub async fn send(&self, spec: RequestSpec) -> Result<ApiResponse, GatewayError> {
        let request_id = Uuid::new_v4();
        let epoch = self.coordinator().epoch();
        let token = self.access_token().await;

        let response = self.execute(&spec, token.as_deref(), request_id).await?;

        if response.status != StatusCode::UNAUTHORIZED || !spec.refresh_on_unauthorized {
            return Ok(response);
        }

        tracing::debug!(%request_id, path = %spec.path, "Received 401, waiting for session refresh");

        let admission = self.coordinator().on_unauthorized(epoch);
        let outcome = match admission {
            Admission::Settled(outcome) => outcome,
            Admission::Wait(rx) => Self::wait_for(rx).await,
            Admission::Lead(rx) => {
                // the cycle must settle even if this caller is dropped
                let gateway = self.clone();
                tokio::spawn(async move { gateway.run_refresh_cycle().await });
                Self::wait_for(rx).await
            }
        };

        let token = outcome?;

        tracing::debug!(%request_id, path = %spec.path, "Retrying with refreshed token");

        // the retry goes straight to the wire; a second 401 is final
        self.execute(&spec, Some(&token), request_id).await
    }

    async fn wait_for(rx: oneshot::Receiver<RefreshOutcome>) -> RefreshOutcome {
        rx.await.unwrap_or_else(|_| {
            Err(SessionError::Transport(
                "refresh cycle ended without settling".to_string(),
            ))
        })
    }

    async fn run_refresh_cycle(&self) {
        let outcome = self.refresh_session().await;

        match &outcome {
            Ok(_) => tracing::info!("Token refreshed successfully"),
            Err(e) => tracing::error!("Token refresh failed: {}", e),
        }

        let delivered = self.coordinator().settle(outcome);
        tracing::debug!(delivered, "Refresh cycle settled");
    }

    async fn refresh_session(&self) -> RefreshOutcome {
        let Some(refresh_token) = self
            .credentials()
            .await
            .map(|c| c.refresh_token)
            .filter(|t| !t.is_empty())
        else {
            tracing::info!("No refresh token available, ending session");
            self.clear_credentials().await;
            return Err(SessionError::NoRefreshToken);
        };

        let result = self.call_refresh_endpoint(&refresh_token).await;

        // a sign-in or sign-out that landed while the call was out owns the store now
        match self.credentials().await {
            Some(current) if current.refresh_token != refresh_token => {
                tracing::info!("Session replaced during refresh, keeping the new one");
                return Ok(current.access_token);
            }
            None => {
                tracing::info!("Session ended during refresh, discarding its result");
                return Err(SessionError::SignedOut);
            }
            Some(_) => {}
        }

        match result {
            Ok((access_token, new_refresh_token)) => {
                let credentials = Credentials::new(
                    access_token,
                    new_refresh_token.unwrap_or(refresh_token),
                );
                if let Err(e) = self.inner.store.store(&credentials).await {
                    tracing::warn!("Failed to persist refreshed tokens: {}", e);
                }
                Ok(credentials.access_token)
            }
            Err(e) => {
                self.clear_credentials().await;
                Err(e)
            }
        }
    }

    async fn call_refresh_endpoint(
        &self,
        refresh_token: &str,
    ) -> Result<(String, Option<String>), SessionError> {
        let response = self
            .inner
            .client
            .post(self.url("/auth/refresh-token"))
            .json(&RefreshTokenRequest {
                refresh_token: refresh_token.to_string(),
            })
            .send()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::MissingAccessToken)?;

        Ok((access_token, body.refresh_token.filter(|t| !t.is_empty())))
    }

    async fn execute(
        &self,
        spec: &RequestSpec,
        token: Option<&str>,
        request_id: Uuid,
    ) -> Result<ApiResponse, GatewayError> {
        let mut builder = self
            .inner
            .client
            .request(spec.method.clone(), self.url(&spec.path));

        if !spec.query.is_empty() {
            builder = builder.query(&spec.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder = match &spec.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Avatar(upload)) => builder.multipart(avatar_form(upload)?),
            None => builder,
        };

        tracing::debug!(
            %request_id,
            method = %spec.method,
            path = %spec.path,
            authenticated = token.is_some(),
            "Sending request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(%request_id, status = status.as_u16(), "Received response");

        Ok(ApiResponse { status, body })
    }
}

fn avatar_form(upload: &AvatarUpload) -> Result<Form, GatewayError> {
    let part = Part::bytes(upload.bytes.clone())
        .file_name(upload.file_name.clone())
        .mime_str(&upload.mime_type)
        .map_err(|e| GatewayError::Encode(e.to_string()))?;
    Ok(Form::new().part("avatar", part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credentials::MemoryCredentialStore;

    fn gateway(base_url: &str) -> Gateway {
        Gateway::new(
            base_url,
            Duration::from_secs(5),
            Arc::new(MemoryCredentialStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_url_joining() {
        let gw = gateway("http://api.test/api/");
        assert_eq!(gw.base_url(), "http://api.test/api");
        assert_eq!(gw.url("/matches"), "http://api.test/api/matches");
        assert_eq!(gw.url("tests"), "http://api.test/api/tests");
    }

    #[test]
    fn test_request_spec_builder() {
        let spec = RequestSpec::get("/test-responses")
            .query("page", 2)
            .query("limit", 10)
            .without_refresh();

        assert_eq!(spec.method(), &Method::GET);
        assert_eq!(spec.path(), "/test-responses");
        assert_eq!(spec.query.len(), 2);
        assert!(!spec.refresh_on_unauthorized);
    }

    #[test]
    fn test_error_message_extraction() {
        let json = ApiResponse {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"message":"Complete all tests first"}"#.to_string(),
        };
        assert_eq!(json.error_message().as_deref(), Some("Complete all tests first"));

        let plain = ApiResponse {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream down".to_string(),
        };
        assert_eq!(plain.error_message().as_deref(), Some("upstream down"));

        let empty = ApiResponse {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        assert!(empty.error_message().is_none());
    }

    #[test]
    fn test_invalid_avatar_mime_is_rejected() {
        let upload = AvatarUpload {
            file_name: "me.png".to_string(),
            mime_type: "not a mime".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert!(matches!(avatar_form(&upload), Err(GatewayError::Encode(_))));
    }

    #[tokio::test]
    async fn test_session_install_and_end() {
        let gw = gateway("http://api.test");
        assert!(!gw.has_session().await);

        gw.install_session(Credentials::new("a1", "r1")).await;
        assert_eq!(gw.access_token().await.as_deref(), Some("a1"));

        gw.end_session().await;
        assert!(gw.access_token().await.is_none());
        assert!(!gw.is_refreshing());
        assert_eq!(gw.pending_requests(), 0);
    }
}
