//! Shared application state
//!
//! Every long-lived collaborator is constructed once at startup and shared
//! through this struct. Cloning only bumps reference counts.

use crate::middleware::SessionConfig;
use crate::models::{SnippetRepository, SqliteSnippetRepository, SqliteUserRepository, UserRepository};
use crate::password::PasswordHasher;
use crate::session::{MemoryStore, SessionStore};
use crate::templates::{RenderError, Renderer, Templates};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Snippet collaborator
    pub snippets: Arc<dyn SnippetRepository>,
    /// User collaborator
    pub users: Arc<dyn UserRepository>,
    /// Session backend
    pub sessions: Arc<dyn SessionStore>,
    /// Page renderer
    pub templates: Arc<dyn Renderer>,
    /// Session cookie settings
    pub session_config: SessionConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("session_config", &self.session_config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble state from explicit collaborators
    #[must_use]
    pub fn new(
        snippets: Arc<dyn SnippetRepository>,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionStore>,
        templates: Arc<dyn Renderer>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            snippets,
            users,
            sessions,
            templates,
            session_config,
        }
    }

    /// SQLite repositories, in-memory sessions and the embedded templates
    ///
    /// # Errors
    ///
    /// Returns an error if the templates do not compile.
    pub fn sqlite(
        pool: SqlitePool,
        hasher: PasswordHasher,
        session_config: SessionConfig,
    ) -> Result<Self, RenderError> {
        Ok(Self::new(
            Arc::new(SqliteSnippetRepository::new(pool.clone())),
            Arc::new(SqliteUserRepository::new(pool, hasher)),
            Arc::new(MemoryStore::new()),
            Arc::new(Templates::new()?),
            session_config,
        ))
    }
}
