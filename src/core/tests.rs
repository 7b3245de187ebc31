#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::core::auth::{AuthApiState, AuthService, JwtConfig, JwtService, PasswordHasher};
    use crate::core::config::{Config, RefreshPolicy};
    use crate::core::db::MemoryUserStore;
    use crate::core::server::{app_router, build_state};

    fn test_config(policy: RefreshPolicy) -> Config {
        Config {
            access_secret: Some("router-test-access-secret".to_string()),
            refresh_secret: Some("router-test-refresh-secret".to_string()),
            bcrypt_cost: 4,
            refresh_policy: policy,
            ..Default::default()
        }
    }

    fn test_app(policy: RefreshPolicy) -> Router {
        let state = build_state(&test_config(policy), MemoryUserStore::new()).unwrap();
        app_router(state)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, json)
    }

    async fn register(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
        send(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
        send(
            app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn refresh(app: &Router, token: &str) -> (StatusCode, Value) {
        send(
            app,
            Method::POST,
            "/auth/refresh",
            None,
            Some(json!({ "refreshToken": token })),
        )
        .await
    }

    fn tokens(body: &Value) -> (String, String) {
        (
            body["accessToken"].as_str().unwrap().to_string(),
            body["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    // ========================================================================
    // Register / Login
    // ========================================================================

    #[tokio::test]
    async fn test_register_then_login() {
        let app = test_app(RefreshPolicy::Reuse);

        let (status, body) = register(&app, "alice@x.com", "pw123").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "User registered successfully");
        assert!(body["userId"].is_string());
        assert!(body.get("passwordHash").is_none());

        let (status, body) = login(&app, "alice@x.com", "pw123").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Login successful");

        let (access, refresh) = tokens(&body);
        assert_eq!(access.split('.').count(), 3);
        assert_eq!(refresh.split('.').count(), 3);
        assert_ne!(access, refresh);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let app = test_app(RefreshPolicy::Reuse);
        register(&app, "alice@x.com", "pw123").await;

        let (status, body) = register(&app, "alice@x.com", "pw456").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User already exists");
    }

    #[tokio::test]
    async fn test_register_missing_fields() {
        let app = test_app(RefreshPolicy::Reuse);

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "alice@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email and password are required");

        // No body at all
        let (status, body) = send(&app, Method::POST, "/auth/register", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email and password are required");
    }

    #[tokio::test]
    async fn test_login_missing_fields() {
        let app = test_app(RefreshPolicy::Reuse);

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "password": "pw123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email and password are required");
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let app = test_app(RefreshPolicy::Reuse);
        register(&app, "alice@x.com", "pw123").await;

        let wrong_password = login(&app, "alice@x.com", "wrong").await;
        let unknown_email = login(&app, "nobody@x.com", "pw123").await;

        assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password, unknown_email);
        assert_eq!(wrong_password.1["message"], "Invalid credentials");
    }

    // ========================================================================
    // Gatekeeping
    // ========================================================================

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = test_app(RefreshPolicy::Reuse);

        let (status, body) = send(&app, Method::GET, "/test", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Access token required");

        let (status, body) = send(&app, Method::GET, "/test", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired access token");
    }

    #[tokio::test]
    async fn test_protected_route_rejects_refresh_token() {
        let app = test_app(RefreshPolicy::Reuse);
        register(&app, "alice@x.com", "pw123").await;
        let (_, body) = login(&app, "alice@x.com", "pw123").await;
        let (_, refresh_token) = tokens(&body);

        let (status, _) = send(&app, Method::GET, "/test", Some(&refresh_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_access_token_is_unauthorized() {
        let auth_service = AuthService::new(
            MemoryUserStore::new(),
            JwtService::new(JwtConfig::new("a", "r").access_token_expiration(-1)),
            PasswordHasher::new(4),
        );
        let app = app_router(AuthApiState { auth_service });

        register(&app, "alice@x.com", "pw123").await;
        let (_, body) = login(&app, "alice@x.com", "pw123").await;
        let (access, refresh_token) = tokens(&body);

        let (status, _) = send(&app, Method::GET, "/test", Some(&access), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // The refresh token is still good; it mints another (equally short) access token
        let (status, body) = refresh(&app, &refresh_token).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["accessToken"].is_string());
    }

    #[tokio::test]
    async fn test_logout_requires_token() {
        let app = test_app(RefreshPolicy::Reuse);

        let (status, body) = send(&app, Method::POST, "/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    #[tokio::test]
    async fn test_end_to_end_session_lifecycle() {
        let app = test_app(RefreshPolicy::Reuse);

        let (status, _) = register(&app, "alice@x.com", "pw123").await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = login(&app, "alice@x.com", "pw123").await;
        assert_eq!(status, StatusCode::OK);
        let (access, refresh_token) = tokens(&body);

        let (status, body) = send(&app, Method::GET, "/test", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Protected route working");

        let (status, body) = send(&app, Method::POST, "/auth/logout", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out successfully");

        // Access tokens are stateless: still accepted until they expire
        let (status, _) = send(&app, Method::GET, "/test", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);

        // The refresh token was cleared by logout
        let (status, body) = refresh(&app, &refresh_token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Invalid or expired refresh token");
    }

    #[tokio::test]
    async fn test_logout_twice_succeeds() {
        let app = test_app(RefreshPolicy::Reuse);
        register(&app, "alice@x.com", "pw123").await;
        let (_, body) = login(&app, "alice@x.com", "pw123").await;
        let (access, _) = tokens(&body);

        let (first, _) = send(&app, Method::POST, "/auth/logout", Some(&access), None).await;
        let (second, _) = send(&app, Method::POST, "/auth/logout", Some(&access), None).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_second_login_supersedes_first_refresh_token() {
        let app = test_app(RefreshPolicy::Reuse);
        register(&app, "alice@x.com", "pw123").await;

        let (_, first) = login(&app, "alice@x.com", "pw123").await;
        let (_, second) = login(&app, "alice@x.com", "pw123").await;
        let (_, r1) = tokens(&first);
        let (_, r2) = tokens(&second);

        let (status, _) = refresh(&app, &r1).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = refresh(&app, &r2).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["accessToken"].is_string());
        assert!(body.get("refreshToken").is_none());

        // Reuse policy: r2 keeps working
        let (status, _) = refresh(&app, &r2).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refreshed_access_token_opens_protected_route() {
        let app = test_app(RefreshPolicy::Reuse);
        register(&app, "alice@x.com", "pw123").await;
        let (_, body) = login(&app, "alice@x.com", "pw123").await;
        let (_, refresh_token) = tokens(&body);

        let (_, body) = refresh(&app, &refresh_token).await;
        let access = body["accessToken"].as_str().unwrap();

        let (status, _) = send(&app, Method::GET, "/test", Some(access), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_validation_and_invalid_tokens() {
        let app = test_app(RefreshPolicy::Reuse);

        let (status, body) = send(&app, Method::POST, "/auth/refresh", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Refresh token required");

        let (status, _) = refresh(&app, "not.a.token").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        register(&app, "alice@x.com", "pw123").await;
        let (_, body) = login(&app, "alice@x.com", "pw123").await;
        let (access, _) = tokens(&body);

        // An access token is signed with the other secret
        let (status, _) = refresh(&app, &access).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_rotation_policy() {
        let app = test_app(RefreshPolicy::Rotate);
        register(&app, "alice@x.com", "pw123").await;
        let (_, body) = login(&app, "alice@x.com", "pw123").await;
        let (_, r1) = tokens(&body);

        let (status, body) = refresh(&app, &r1).await;
        assert_eq!(status, StatusCode::OK);
        let r2 = body["refreshToken"].as_str().unwrap().to_string();
        assert_ne!(r1, r2);

        let (status, _) = refresh(&app, &r1).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = refresh(&app, &r2).await;
        assert_eq!(status, StatusCode::OK);
    }

    // ========================================================================
    // Health
    // ========================================================================

    #[tokio::test]
    async fn test_health() {
        let app = test_app(RefreshPolicy::Reuse);

        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
