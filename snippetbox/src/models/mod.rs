//! Storage collaborators
//!
//! Handlers and middleware only see the repository traits; the SQLite
//! implementations are wired up in [`crate::state::AppState`].

pub mod snippets;
pub mod users;

pub use snippets::{Snippet, SnippetRepository, SqliteSnippetRepository};
pub use users::{SqliteUserRepository, User, UserRepository};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// No matching record
    #[error("no matching record found")]
    NoRecord,

    /// Email or password did not match
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Email address is already registered
    #[error("duplicate email")]
    DuplicateEmail,

    /// Database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Hashing or verification could not run
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}
