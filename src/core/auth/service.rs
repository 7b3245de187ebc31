//! Authentication service
//!
//! Provides business logic for user registration, login, logout, and token refresh.
//! Coordinates between the user store, the password hasher and the JWT service.
//!
//! Per-user session state lives entirely in the stored refresh token:
//! `None` is logged out, `Some(t)` is logged in with `t` as the only refresh
//! token that will be honoured. Login overwrites it, logout clears it, and
//! refresh only reads it (or swaps it under [`RefreshPolicy::Rotate`]).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::jwt::{JwtError, JwtService, TokenPair};
use crate::core::auth::password::{PasswordError, PasswordHasher};
use crate::core::config::RefreshPolicy;
use crate::core::db::repositories::{UserRepositoryError, UserStore};

/// Authentication service error types
///
/// The display strings are the client-facing messages.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    ValidationError(&'static str),

    #[error("User already exists")]
    Conflict,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Invalid or expired refresh token")]
    InvalidToken,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<UserRepositoryError> for AuthError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::EmailAlreadyExists => AuthError::Conflict,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::InternalError(err.to_string())
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Encoding(_) | JwtError::MissingSecret(_) => {
                AuthError::InternalError(err.to_string())
            }
            JwtError::Malformed
            | JwtError::BadSignature
            | JwtError::Expired
            | JwtError::WrongTokenType => AuthError::InvalidToken,
        }
    }
}

/// Registration request data
///
/// Fields are optional so a missing field is a validation error rather than
/// a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Login request data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Token refresh request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Result of a successful refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedTokens {
    pub access_token: String,
    /// Present only when refresh tokens are rotated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService<S> {
    users: S,
    jwt_service: JwtService,
    hasher: PasswordHasher,
    refresh_policy: RefreshPolicy,
}

fn require<'a>(value: &'a Option<String>, message: &'static str) -> Result<&'a str, AuthError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthError::ValidationError(message)),
    }
}

const MISSING_CREDENTIALS: &str = "Email and password are required";

impl<S: UserStore> AuthService<S> {
    /// Create a new authentication service
    pub fn new(users: S, jwt_service: JwtService, hasher: PasswordHasher) -> Self {
        Self {
            users,
            jwt_service,
            hasher,
            refresh_policy: RefreshPolicy::default(),
        }
    }

    /// Choose how refresh treats the presented token
    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.refresh_policy = policy;
        self
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.refresh_policy
    }

    pub fn users(&self) -> &S {
        &self.users
    }

    /// Register a new user, returning its ID
    pub async fn register(&self, request: RegisterRequest) -> Result<Uuid, AuthError> {
        let email = require(&request.email, MISSING_CREDENTIALS)?;
        let password = require(&request.password, MISSING_CREDENTIALS)?;

        if self.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::Conflict);
        }

        let password_hash = self.hasher.hash(password)?;
        let user = self.users.create(email, &password_hash).await?;

        Ok(user.id)
    }

    /// Login an existing user
    ///
    /// Unknown email and wrong password produce the same error. A successful
    /// login replaces any refresh token stored by an earlier login.
    pub async fn login(&self, request: LoginRequest) -> Result<TokenPair, AuthError> {
        let email = require(&request.email, MISSING_CREDENTIALS)?;
        let password = require(&request.password, MISSING_CREDENTIALS)?;

        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                self.hasher.burn(password);
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.hasher.verify(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.jwt_service.issue_pair(user.id)?;

        self.users
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;

        Ok(tokens)
    }

    /// Logout a user (invalidate refresh token). Idempotent.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.users.set_refresh_token(user_id, None).await?;
        Ok(())
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, request: RefreshRequest) -> Result<RefreshedTokens, AuthError> {
        let presented = require(&request.refresh_token, "Refresh token required")?;

        let user_id = self.jwt_service.verify_refresh(presented).map_err(|e| {
            tracing::debug!("Refresh token rejected: {}", e);
            AuthError::InvalidToken
        })?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        // Catches tokens superseded by a later login or cleared by logout
        if !user.holds_refresh_token(presented) {
            tracing::debug!("Stale refresh token presented for user {}", user_id);
            return Err(AuthError::InvalidToken);
        }

        let access = self.jwt_service.issue_access(user.id)?;

        match self.refresh_policy {
            RefreshPolicy::Reuse => Ok(RefreshedTokens {
                access_token: access.token,
                refresh_token: None,
            }),
            RefreshPolicy::Rotate => {
                let rotated = self.jwt_service.issue_refresh(user.id)?;
                let swapped = self
                    .users
                    .swap_refresh_token(user.id, presented, &rotated.token)
                    .await?;

                if !swapped {
                    // Another refresh, login or logout got there first
                    return Err(AuthError::InvalidToken);
                }

                Ok(RefreshedTokens {
                    access_token: access.token,
                    refresh_token: Some(rotated.token),
                })
            }
        }
    }

    /// Validate an access token and return the user ID if valid.
    ///
    /// The distinct `JwtError` kinds are kept for the caller.
    pub fn verify_access_token(&self, token: &str) -> Result<Uuid, JwtError> {
        self.jwt_service.verify_access(token)
    }
}
