//! Client session manager
//!
//! Talks to the auth API, keeps the token pair in a [`SessionStore`] and
//! attaches the access token to every call. A call answered with 401 gets
//! exactly one recovery: refresh the access token, retry once, hand the
//! retry's response back. When the refresh itself is rejected the session is
//! cleared and the listener is told to send the user back to login.
//!
//! Refreshes are single-flight. Concurrent callers that all hit 401 queue on
//! one gate; the first refreshes, the rest see the replaced access token and
//! retry with it.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::storage::{SessionStore, SessionTokens, StorageError};

pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

const SESSION_EXPIRED: &str = "Session expired, please log in again";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Session expired, please log in again")]
    SessionExpired,

    /// The server answered with an error status
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

/// Receives user-facing feedback from the session manager
pub trait SessionListener: Send + Sync + 'static {
    /// A message worth showing the user, usually a rejected action
    fn notify(&self, message: &str) {
        tracing::info!("{}", message);
    }

    /// The session is gone; the user has to log in again
    fn session_expired(&self) {
        tracing::info!("Session expired, login required");
    }
}

/// Listener that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl SessionListener for LogListener {}

/// A request that can be sent again after a token refresh
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
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

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and decoded JSON body of a response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// `Value::Null` when the body is empty or not JSON
    pub body: Value,
}

impl ApiResponse {
    async fn read(response: reqwest::Response) -> Result<Self, SessionError> {
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok(Self { status, body })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The `message` field every API response carries
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    fn into_rejection(self) -> SessionError {
        let message = self
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", self.status));
        SessionError::Rejected {
            status: self.status,
            message,
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    user_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Owner of the client's session state
pub struct SessionManager<S> {
    http: reqwest::Client,
    base_url: String,
    store: S,
    listener: Arc<dyn SessionListener>,
    refresh_gate: Mutex<()>,
    refresh_timeout: Duration,
}

impl<S: SessionStore> SessionManager<S> {
    pub fn new(base_url: impl Into<String>, store: S) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            listener: Arc::new(LogListener),
            refresh_gate: Mutex::new(()),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_authenticated(&self) -> Result<bool, SessionError> {
        Ok(self.store.load()?.is_some())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, email: &str, password: &str) -> Result<Uuid, SessionError> {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(&Credentials { email, password })
            .send()
            .await?;
        let response = self.surface(ApiResponse::read(response).await?);

        if !response.is_success() {
            return Err(response.into_rejection());
        }

        let body: RegisterBody = response
            .json()
            .map_err(|_| unexpected_body(response.status))?;
        Ok(body.user_id)
    }

    /// Log in and store the token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&Credentials { email, password })
            .send()
            .await?;
        let response = self.surface(ApiResponse::read(response).await?);

        if !response.is_success() {
            return Err(response.into_rejection());
        }

        let body: LoginBody = response
            .json()
            .map_err(|_| unexpected_body(response.status))?;

        // Holding the gate keeps an in-flight refresh from writing over the new pair
        let _gate = self.refresh_gate.lock().await;
        self.store.save(&SessionTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
        })?;

        tracing::debug!("Session established");
        Ok(())
    }

    /// Log out. The server call is best effort; local state is cleared
    /// whatever it answers.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _gate = self.refresh_gate.lock().await;

        let stored = self.store.load().unwrap_or_else(|e| {
            tracing::warn!("Unreadable session during logout: {}", e);
            None
        });

        if let Some(tokens) = stored {
            let result = self
                .http
                .post(self.url("/auth/logout"))
                .bearer_auth(&tokens.access_token)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::warn!("Server rejected logout with status {}", response.status())
                }
                Err(e) => tracing::warn!("Logout request failed: {}", e),
            }
        }

        self.store.clear()?;
        tracing::debug!("Session cleared");
        Ok(())
    }

    /// Send an authenticated request, refreshing and retrying once on 401
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let access_token = match self.store.load() {
            Ok(tokens) => tokens.map(|t| t.access_token),
            Err(StorageError::Serialization(e)) => {
                tracing::warn!("Corrupt session discarded: {}", e);
                let _gate = self.refresh_gate.lock().await;
                return self.expire();
            }
            Err(e) => return Err(e.into()),
        };

        let response = self.send(&request, access_token.as_deref()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(self.surface(response));
        }

        tracing::debug!("{} {} answered 401, refreshing", request.method, request.path);
        let fresh = self.refresh_access_token(access_token.as_deref()).await?;

        let retried = self.send(&request, Some(&fresh)).await?;
        Ok(self.surface(retried))
    }

    async fn send(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, SessionError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path));

        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        ApiResponse::read(builder.send().await?).await
    }

    /// Obtain an access token newer than `stale`.
    ///
    /// Only one refresh runs at a time. A caller that finds the stored
    /// access token already replaced returns it without refreshing again.
    async fn refresh_access_token(&self, stale: Option<&str>) -> Result<String, SessionError> {
        let _gate = self.refresh_gate.lock().await;

        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(StorageError::Serialization(e)) => {
                tracing::warn!("Corrupt session discarded: {}", e);
                return self.expire();
            }
            Err(e) => return Err(e.into()),
        };

        let Some(tokens) = stored else {
            // Never logged in: send the user to login. A session cleared by
            // another caller has already done so.
            if stale.is_none() {
                self.listener.notify(SESSION_EXPIRED);
                self.listener.session_expired();
            }
            return Err(SessionError::SessionExpired);
        };

        if stale != Some(tokens.access_token.as_str()) {
            return Ok(tokens.access_token);
        }

        let outcome = tokio::time::timeout(
            self.refresh_timeout,
            self.request_refresh(&tokens.refresh_token),
        )
        .await;

        let refreshed = match outcome {
            Ok(Ok(Some(refreshed))) => refreshed,
            Ok(Ok(None)) => return self.expire(),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                tracing::warn!(
                    "Token refresh timed out after {:?}",
                    self.refresh_timeout
                );
                return self.expire();
            }
        };

        match refreshed.refresh_token {
            Some(refresh_token) => self.store.save(&SessionTokens {
                access_token: refreshed.access_token.clone(),
                refresh_token,
            })?,
            None => self.store.set_access_token(&refreshed.access_token)?,
        }

        tracing::debug!("Access token refreshed");
        Ok(refreshed.access_token)
    }

    /// `None` when the server refused the refresh token or answered with a
    /// body that is not a token
    async fn request_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<Option<RefreshBody>, SessionError> {
        let response = self
            .http
            .post(self.url("/auth/refresh"))
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::info!("Refresh rejected with status {}", response.status());
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        match serde_json::from_slice(&bytes) {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(e) => {
                tracing::warn!("Undecodable refresh response: {}", e);
                Ok(None)
            }
        }
    }

    /// Drop all session state and send the user back to login
    ///
    /// The listener hears about it even when the store cannot be cleared.
    fn expire<T>(&self) -> Result<T, SessionError> {
        let cleared = self.store.clear();
        self.listener.notify(SESSION_EXPIRED);
        self.listener.session_expired();
        cleared?;
        Err(SessionError::SessionExpired)
    }

    /// Tell the user about a rejected action
    fn surface(&self, response: ApiResponse) -> ApiResponse {
        if !response.is_success() {
            if let Some(message) = response.message() {
                self.listener.notify(message);
            }
        }
        response
    }
}

fn unexpected_body(status: StatusCode) -> SessionError {
    SessionError::Rejected {
        status,
        message: "Unexpected response body".to_string(),
    }
}
