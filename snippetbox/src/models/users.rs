//! User storage

use super::ModelError;
use crate::password::PasswordHasher;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;

/// A registered user
///
/// The password digest stays in the database and is never loaded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    /// Row id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Login email, unique
    pub email: String,
    /// Signup time
    pub created: DateTime<Utc>,
}

/// User collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Register a user
    ///
    /// Returns [`ModelError::DuplicateEmail`] if the email is taken.
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError>;

    /// Check credentials, returning the user id
    ///
    /// Returns [`ModelError::InvalidCredentials`] for an unknown email or a
    /// wrong password.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError>;

    /// Check whether a user with `id` exists
    async fn exists(&self, id: i64) -> Result<bool, ModelError>;

    /// Fetch a user
    ///
    /// Returns [`ModelError::NoRecord`] for unknown ids.
    async fn get(&self, id: i64) -> Result<User, ModelError>;

    /// Replace the password after checking the current one
    ///
    /// Returns [`ModelError::InvalidCredentials`] if `current` is wrong.
    async fn password_update(&self, id: i64, current: &str, new: &str) -> Result<(), ModelError>;
}

/// SQLite-backed user repository
#[derive(Debug, Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
    hasher: Arc<PasswordHasher>,
}

impl SqliteUserRepository {
    /// Create a repository over `pool`
    #[must_use]
    pub fn new(pool: SqlitePool, hasher: PasswordHasher) -> Self {
        Self {
            pool,
            hasher: Arc::new(hasher),
        }
    }

    async fn hash(&self, password: &str) -> Result<String, ModelError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ModelError::PasswordHash(e.to_string()))?
            .map_err(|e| ModelError::PasswordHash(e.to_string()))
    }

    async fn verify(&self, password: &str, hash: String) -> Result<bool, ModelError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| ModelError::PasswordHash(e.to_string()))
    }

    async fn hash_by_email(&self, email: &str) -> Result<Option<(i64, String)>, ModelError> {
        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, hashed_password FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn hash_by_id(&self, id: i64) -> Result<Option<String>, ModelError> {
        let hash = sqlx::query_scalar::<_, String>("SELECT hashed_password FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError> {
        let hashed = self.hash(password).await?;

        let result = sqlx::query(
            "INSERT INTO users (name, email, hashed_password, created) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(hashed)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ModelError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let Some((id, hash)) = self.hash_by_email(email).await? else {
            return Err(ModelError::InvalidCredentials);
        };

        if self.verify(password, hash).await? {
            Ok(id)
        } else {
            Err(ModelError::InvalidCredentials)
        }
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn get(&self, id: i64) -> Result<User, ModelError> {
        sqlx::query_as::<_, User>("SELECT id, name, email, created FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ModelError::NoRecord)
    }

    async fn password_update(&self, id: i64, current: &str, new: &str) -> Result<(), ModelError> {
        let Some(hash) = self.hash_by_id(id).await? else {
            return Err(ModelError::NoRecord);
        };

        if !self.verify(current, hash).await? {
            return Err(ModelError::InvalidCredentials);
        }

        let hashed = self.hash(new).await?;
        sqlx::query("UPDATE users SET hashed_password = ? WHERE id = ?")
            .bind(hashed)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::password::PasswordConfig;

    async fn repo() -> SqliteUserRepository {
        let pool = db::connect_in_memory().await.unwrap();
        let hasher = PasswordHasher::new(PasswordConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        })
        .unwrap();
        SqliteUserRepository::new(pool, hasher)
    }

    #[tokio::test]
    async fn test_signup_then_authenticate() {
        let repo = repo().await;
        repo.insert("Alice", "alice@example.com", "pa55word!").await.unwrap();

        let id = repo.authenticate("alice@example.com", "pa55word!").await.unwrap();
        assert!(repo.exists(id).await.unwrap());

        let user = repo.get(id).await.unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let repo = repo().await;
        repo.insert("Alice", "alice@example.com", "pa55word!").await.unwrap();
        let err = repo
            .insert("Other", "alice@example.com", "different1")
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let repo = repo().await;
        repo.insert("Alice", "alice@example.com", "pa55word!").await.unwrap();

        assert!(matches!(
            repo.authenticate("alice@example.com", "wrong-password").await,
            Err(ModelError::InvalidCredentials)
        ));
        assert!(matches!(
            repo.authenticate("nobody@example.com", "pa55word!").await,
            Err(ModelError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let repo = repo().await;
        assert!(!repo.exists(42).await.unwrap());
        assert!(matches!(repo.get(42).await, Err(ModelError::NoRecord)));
    }

    #[tokio::test]
    async fn test_password_update() {
        let repo = repo().await;
        repo.insert("Alice", "alice@example.com", "pa55word!").await.unwrap();
        let id = repo.authenticate("alice@example.com", "pa55word!").await.unwrap();

        assert!(matches!(
            repo.password_update(id, "not-current", "brand-new-1").await,
            Err(ModelError::InvalidCredentials)
        ));

        repo.password_update(id, "pa55word!", "brand-new-1").await.unwrap();
        assert!(repo.authenticate("alice@example.com", "pa55word!").await.is_err());
        assert_eq!(
            repo.authenticate("alice@example.com", "brand-new-1").await.unwrap(),
            id
        );
    }
}
