//! In-memory user store
//!
//! Same contract as the PostgreSQL repository, kept in a `DashMap`. Used for
//! local development without a database and by the router tests.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::user::{UserRepositoryError, UserStore};
use crate::core::db::models::User;

#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<DashMap<Uuid, User>>,
    /// email -> id, the unique index
    emails: Arc<DashMap<String, Uuid>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserStore for MemoryUserStore {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, UserRepositoryError> {
        // Claiming the email slot first makes duplicate registration atomic
        let id = match self.emails.entry(email.to_string()) {
            Entry::Occupied(_) => return Err(UserRepositoryError::EmailAlreadyExists),
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                slot.insert(id);
                id
            }
        };

        let now = Utc::now();
        let user = User {
            id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(id, user.clone());

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        let id = match self.emails.get(email) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserRepositoryError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<(), UserRepositoryError> {
        if let Some(mut user) = self.users.get_mut(&id) {
            user.refresh_token = token.map(str::to_string);
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        new_token: &str,
    ) -> Result<bool, UserRepositoryError> {
        // get_mut holds the shard write lock for the compare and the write
        match self.users.get_mut(&id) {
            Some(mut user) if user.holds_refresh_token(expected) => {
                user.refresh_token = Some(new_token.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), UserRepositoryError> {
        Ok(())
    }
}
