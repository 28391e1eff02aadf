//! Snippet storage

use super::ModelError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

/// Number of snippets shown on the home page
pub const LATEST_LIMIT: i64 = 10;

/// A stored snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Snippet {
    /// Row id
    pub id: i64,
    /// Title, at most 100 characters
    pub title: String,
    /// Body text
    pub content: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Instant after which the snippet is hidden
    pub expires: DateTime<Utc>,
}

/// Snippet collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnippetRepository: Send + Sync + 'static {
    /// Store a snippet that expires `expires_days` from now, returning its id
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> Result<i64, ModelError>;

    /// Fetch an unexpired snippet
    ///
    /// Returns [`ModelError::NoRecord`] for unknown or expired ids.
    async fn get(&self, id: i64) -> Result<Snippet, ModelError>;

    /// Up to ten unexpired snippets, newest first
    async fn latest(&self) -> Result<Vec<Snippet>, ModelError>;
}

/// SQLite-backed snippet repository
#[derive(Debug, Clone)]
pub struct SqliteSnippetRepository {
    pool: SqlitePool,
}

impl SqliteSnippetRepository {
    /// Create a repository over `pool`
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnippetRepository for SqliteSnippetRepository {
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> Result<i64, ModelError> {
        let created = Utc::now();
        let expires = created + Duration::days(expires_days);

        let result = sqlx::query(
            "INSERT INTO snippets (title, content, created, expires) VALUES (?, ?, ?, ?)",
        )
        .bind(title)
        .bind(content)
        .bind(created)
        .bind(expires)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        sqlx::query_as::<_, Snippet>(
            "SELECT id, title, content, created, expires FROM snippets
             WHERE expires > ? AND id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, ModelError> {
        let snippets = sqlx::query_as::<_, Snippet>(
            "SELECT id, title, content, created, expires FROM snippets
             WHERE expires > ? ORDER BY id DESC LIMIT ?",
        )
        .bind(Utc::now())
        .bind(LATEST_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(snippets)
    }
}
