//! Database models for tasktrack
//!
//! This module defines the database entity structs that map to PostgreSQL tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity representing a registered user
///
/// `refresh_token` holds the one refresh token currently honoured for this
/// user, or `None` while logged out.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether `token` is exactly the stored refresh token
    pub fn holds_refresh_token(&self, token: &str) -> bool {
        self.refresh_token.as_deref() == Some(token)
    }
}
