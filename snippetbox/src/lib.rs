//! Snippetbox: share snippets of text.
//!
//! A server-rendered web application. Every request passes through the
//! standard middleware chain; pages that read or change per-user state also
//! pass through the session, CSRF and authentication stages. See
//! [`middleware::chain`] for the exact order and [`routes`] for which routes
//! get which chain.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod csrf;
pub mod db;
pub mod error;
pub mod extractors;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod routes;
pub mod session;
pub mod state;
pub mod templates;
pub mod validation;

pub use config::{Cli, Config, ConfigError};
pub use error::{AppError, AppResult};
pub use routes::router;
pub use state::AppState;
