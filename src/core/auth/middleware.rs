//! Request gatekeeping for protected routes
//!
//! `require_auth` runs before the handler: it reads the bearer token,
//! verifies it against the access secret and stores the resolved
//! [`AuthUser`] in the request extensions. Any failure answers 401 and the
//! handler never runs. Handlers behind the layer take `AuthUser` as an
//! extractor.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use uuid::Uuid;

use crate::core::auth::api::AuthApiState;
use crate::core::auth::service::AuthError;
use crate::core::db::repositories::UserStore;

const MISSING_TOKEN: &str = "Access token required";
const INVALID_TOKEN: &str = "Invalid or expired access token";

/// Identity resolved from a valid access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Middleware rejecting requests without a valid access token
pub async fn require_auth<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|rejection| {
        tracing::debug!("Rejected request without bearer token: {}", rejection);
        AuthError::Unauthorized(MISSING_TOKEN)
    })?;

    let user_id = state
        .auth_service
        .verify_access_token(bearer.token())
        .map_err(|e| {
            tracing::debug!("Access token rejected: {}", e);
            AuthError::Unauthorized(INVALID_TOKEN)
        })?;

    request.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or(AuthError::Unauthorized(MISSING_TOKEN))
    }
}
