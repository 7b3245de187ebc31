//! Auth API endpoints
//!
//! Provides REST API endpoints for authentication:
//! - POST /auth/register - Register a new user
//! - POST /auth/login - Login and get tokens
//! - POST /auth/logout - Logout (clear the stored refresh token), requires access token
//! - POST /auth/refresh - Exchange a refresh token for a new access token

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::auth::middleware::{AuthUser, require_auth};
use crate::core::auth::service::{
    AuthError, AuthService, LoginRequest, RefreshRequest, RefreshedTokens, RegisterRequest,
};
use crate::core::db::repositories::UserStore;

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState<S> {
    pub auth_service: AuthService<S>,
}

/// JSON body for every error and plain acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ValidationError(_) | AuthError::Conflict => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::FORBIDDEN,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            AuthError::InternalError(detail) => {
                tracing::error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(MessageResponse::new(message))).into_response()
    }
}

/// Response for registration
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Uuid,
}

/// Response for login
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// A missing or unreadable body carries no fields, so the service reports
/// which fields are required.
fn body_or_default<T: Default>(payload: Result<Json<T>, JsonRejection>) -> T {
    match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!("Unreadable request body: {}", rejection);
            T::default()
        }
    }
}

/// Create the auth API router
pub fn auth_api_router<S: UserStore>(state: Arc<AuthApiState<S>>) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout_handler::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<S>,
        ));

    Router::new()
        .route("/auth/register", post(register_handler::<S>))
        .route("/auth/login", post(login_handler::<S>))
        .route("/auth/refresh", post(refresh_handler::<S>))
        .merge(protected)
        .with_state(state)
}

/// POST /auth/register
async fn register_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let request = body_or_default(payload);
    let email = request.email.clone().unwrap_or_default();
    tracing::info!("Registration attempt for email: {}", email);

    let user_id = state.auth_service.register(request).await?;

    tracing::info!("User registered successfully: {} ({})", email, user_id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user_id,
        }),
    ))
}

/// POST /auth/login
async fn login_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let request = body_or_default(payload);
    let email = request.email.clone().unwrap_or_default();
    tracing::info!("Login attempt for email: {}", email);

    let tokens = state.auth_service.login(request).await.inspect_err(|e| {
        if matches!(e, AuthError::InvalidCredentials) {
            tracing::info!("Login failed for email: {}", email);
        }
    })?;

    tracing::info!("User logged in successfully: {}", email);

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

/// POST /auth/logout
async fn logout_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth_service.logout(user.user_id).await?;

    tracing::info!("User logged out: {}", user.user_id);

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// POST /auth/refresh
async fn refresh_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<RefreshedTokens>, AuthError> {
    tracing::debug!("Token refresh request");

    let tokens = state.auth_service.refresh(body_or_default(payload)).await?;

    Ok(Json(tokens))
}
