//! Authentication module for tasktrack
//!
//! This module provides authentication functionality including:
//! - Password hashing with bcrypt
//! - JWT access/refresh token generation and validation
//! - User registration, login, logout and token refresh
//! - Gatekeeping middleware for protected routes
//! - REST API endpoints for auth operations

pub mod api;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use api::{AuthApiState, MessageResponse, auth_api_router};
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, TokenPair, TokenType};
pub use middleware::{AuthUser, require_auth};
pub use password::{PasswordError, PasswordHasher};
pub use service::{
    AuthError, AuthService, LoginRequest, RefreshRequest, RefreshedTokens, RegisterRequest,
};
