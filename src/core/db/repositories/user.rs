//! User repository for database operations
//!
//! The credential store: user rows keyed by id and unique email, plus the
//! single refresh-token column. Every mutation is a single-row statement, so
//! the database's row atomicity is the only synchronisation needed.

use std::future::Future;

use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::DbError;
use crate::core::db::models::User;

/// User repository error types
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl From<DbError> for UserRepositoryError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ConnectionError(e) => UserRepositoryError::DatabaseError(e),
            _ => UserRepositoryError::DatabaseError(sqlx::Error::Protocol(err.to_string())),
        }
    }
}

/// Point lookups and single-row updates over user records.
pub trait UserStore: Clone + Send + Sync + 'static {
    /// Insert a user with an already-hashed password and no refresh token
    fn create(
        &self,
        email: &str,
        password_hash: &str,
    ) -> impl Future<Output = Result<User, UserRepositoryError>> + Send;

    /// Find a user by email (exact match)
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>, UserRepositoryError>> + Send;

    /// Find a user by ID
    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<User>, UserRepositoryError>> + Send;

    /// Overwrite (or clear) the stored refresh token. Missing users are a no-op.
    fn set_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> impl Future<Output = Result<(), UserRepositoryError>> + Send;

    /// Replace the stored refresh token only if it still equals `expected`.
    /// Returns whether the swap happened.
    fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        new_token: &str,
    ) -> impl Future<Output = Result<bool, UserRepositoryError>> + Send;

    /// Check the backing store is reachable
    fn ping(&self) -> impl Future<Output = Result<(), UserRepositoryError>> + Send;
}

/// PostgreSQL-backed user repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserStore for UserRepository {
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, UserRepositoryError> {
        // Check if email already exists
        if self.find_by_email(email).await?.is_some() {
            return Err(UserRepositoryError::EmailAlreadyExists);
        }

        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, refresh_token, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            // Lost a race with a concurrent registration of the same email
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(UserRepositoryError::EmailAlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, refresh_token, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserRepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, refresh_token, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn set_refresh_token(
        &self,
        id: Uuid,
        token: Option<&str>,
    ) -> Result<(), UserRepositoryError> {
        sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        new_token: &str,
    ) -> Result<bool, UserRepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refresh_token = $3
            WHERE id = $1 AND refresh_token = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(new_token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn ping(&self) -> Result<(), UserRepositoryError> {
        crate::core::db::pool::health_check(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Error Type Tests
    // ========================================================================

    #[test]
    fn test_user_repository_error_display() {
        let err = UserRepositoryError::EmailAlreadyExists;
        assert_eq!(format!("{}", err), "Email already exists");

        let err = UserRepositoryError::DatabaseError(sqlx::Error::RowNotFound);
        assert!(format!("{}", err).starts_with("Database error"));
    }

    #[test]
    fn test_from_db_error() {
        let err: UserRepositoryError = DbError::MissingDatabaseUrl.into();
        assert!(matches!(err, UserRepositoryError::DatabaseError(_)));
    }

    // ========================================================================
    // Integration Tests (require database)
    // ========================================================================

    /// Remove a row created by a test
    async fn delete_user(repo: &UserRepository, id: Uuid) {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&repo.pool)
            .await
            .unwrap();
    }

    fn unique_email(prefix: &str) -> String {
        format!("{}_{}@example.com", prefix, &Uuid::new_v4().to_string()[..8])
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_user() {
        let repo = UserRepository::new(create_test_pool().await);
        let email = unique_email("create");

        let user = repo.create(&email, "$2b$04$hash").await.unwrap();

        assert_eq!(user.email, email);
        assert_eq!(user.password_hash, "$2b$04$hash");
        assert!(user.refresh_token.is_none());

        delete_user(&repo, user.id).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_create_user_duplicate_email() {
        let repo = UserRepository::new(create_test_pool().await);
        let email = unique_email("duplicate");

        let user = repo.create(&email, "hash").await.unwrap();
        let result = repo.create(&email, "hash").await;

        assert!(matches!(
            result,
            Err(UserRepositoryError::EmailAlreadyExists)
        ));

        delete_user(&repo, user.id).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_find_by_id_and_email() {
        let repo = UserRepository::new(create_test_pool().await);
        let email = unique_email("find");

        let created = repo.create(&email, "hash").await.unwrap();

        let by_id = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, email);

        let by_email = repo.find_by_email(&email).await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());

        delete_user(&repo, created.id).await;
    }

    #[tokio::test]
    #[ignore = "requires running PostgreSQL database"]
    async fn test_refresh_token_lifecycle() {
        let repo = UserRepository::new(create_test_pool().await);
        let created = repo.create(&unique_email("refresh"), "hash").await.unwrap();

        repo.set_refresh_token(created.id, Some("t1")).await.unwrap();
        let user = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert!(user.holds_refresh_token("t1"));

        assert!(!repo.swap_refresh_token(created.id, "stale", "t2").await.unwrap());
        assert!(repo.swap_refresh_token(created.id, "t1", "t2").await.unwrap());
        let user = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert!(user.holds_refresh_token("t2"));

        repo.set_refresh_token(created.id, None).await.unwrap();
        repo.set_refresh_token(created.id, None).await.unwrap();
        let user = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert!(user.refresh_token.is_none());

        delete_user(&repo, created.id).await;
    }

    // Helper function to create test pool
    async fn create_test_pool() -> PgPool {
        use crate::core::db::pool::{DbConfig, create_pool_with_migrations};

        let config = DbConfig::from_env().expect("DATABASE_URL must be set for tests");
        create_pool_with_migrations(&config)
            .await
            .expect("Failed to create test pool")
    }
}
