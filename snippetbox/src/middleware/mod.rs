//! Middleware layers for snippetbox
//!
//! Provides middleware for:
//! - Panic recovery
//! - Request logging
//! - Security headers
//! - Session management (cookie-based sessions)
//! - CSRF protection
//! - Authentication (status lookup and route protection)
//!
//! [`chain`] composes them into the three orders the router uses.

pub mod auth;
pub mod chain;
pub mod csrf;
pub mod logging;
pub mod recover;
pub mod security_headers;
pub mod session;

pub use auth::{authenticate, require_authentication, AuthStatus};
pub use chain::{wrap, Chain, Stage};
pub use csrf::csrf_guard;
pub use logging::log_request;
pub use recover::recover_panic;
pub use security_headers::{SecurityHeadersLayer, SecurityHeadersMiddleware};
pub use session::{SameSite, SessionConfig, SessionLayer, SessionMiddleware, SESSION_COOKIE_NAME};
