//! Password hashing with bcrypt
//!
//! Hashes carry their own random salt and cost, so the same password hashes
//! differently on every call and verification needs nothing but the digest.

use crate::core::config::DEFAULT_BCRYPT_COST;

/// Password hashing error types
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingError(String),
}

/// Salted one-way hashing of credentials at rest
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password using bcrypt with automatic salt generation
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        bcrypt::hash(password, self.cost).map_err(|e| PasswordError::HashingError(e.to_string()))
    }

    /// Verify a password against a bcrypt hash.
    ///
    /// A malformed digest is a failed verification, not an error.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::verify(password, hash) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!("Stored password hash could not be parsed: {}", e);
                false
            }
        }
    }

    /// bcrypt work spent on an unknown email, so that "no such user" takes
    /// about as long as "wrong password".
    pub fn burn(&self, password: &str) {
        let _ = self.hash(password);
    }
}
