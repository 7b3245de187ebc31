//! HTTP application assembly
//!
//! Wires the auth routes, the protected probe route and the health check
//! into one router with CORS and request tracing, and runs it.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde_json::json;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::auth::{
    AuthApiState, AuthService, AuthUser, JwtConfig, JwtService, MessageResponse, PasswordHasher,
    auth_api_router, require_auth,
};
use crate::core::config::{Config, ConfigError};
use crate::core::db::repositories::UserStore;

/// Build the auth state for a store from the application config
pub fn build_state<S: UserStore>(config: &Config, store: S) -> Result<AuthApiState<S>, ConfigError> {
    config.validate()?;

    let jwt = JwtConfig::from_config(config)
        .map_err(|_| ConfigError::MissingVar("JWT_ACCESS_SECRET"))?;

    let auth_service = AuthService::new(
        store,
        JwtService::new(jwt),
        PasswordHasher::new(config.bcrypt_cost),
    )
    .with_refresh_policy(config.refresh_policy);

    Ok(AuthApiState { auth_service })
}

/// CORS for the browser client: one exact origin, or any origin when unset
pub fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, ConfigError> {
    let allow_origin = match origin {
        Some(origin) => {
            let value = HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidValue {
                key: "CORS_ALLOWED_ORIGIN",
                value: origin.to_string(),
            })?;
            AllowOrigin::exact(value)
        }
        None => AllowOrigin::from(Any),
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Build the full application router
pub fn app_router<S: UserStore>(state: AuthApiState<S>) -> Router {
    let state = Arc::new(state);

    let protected = Router::new()
        .route("/test", get(protected_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<S>,
        ));

    let service_routes = Router::new()
        .route("/health", get(health_handler::<S>))
        .merge(protected)
        .with_state(state.clone());

    Router::new()
        .merge(auth_api_router(state))
        .merge(service_routes)
        .layer(TraceLayer::new_for_http())
}

/// GET /test
/// Reference protected route
async fn protected_handler(user: AuthUser) -> Json<MessageResponse> {
    tracing::debug!("Protected route hit by user {}", user.user_id);
    Json(MessageResponse::new("Protected route working"))
}

/// GET /health
async fn health_handler<S: UserStore>(
    State(state): State<Arc<AuthApiState<S>>>,
) -> impl IntoResponse {
    match state.auth_service.users().ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

/// Serve the application until the listener fails
pub async fn serve<S: UserStore>(config: &Config, store: S) -> anyhow::Result<()> {
    let state = build_state(config, store)?;
    let app = app_router(state).layer(cors_layer(config.cors_origin.as_deref())?);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
