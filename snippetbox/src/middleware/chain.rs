//! Middleware chain composition
//!
//! Each [`Chain`] is a fixed, ordered list of [`Stage`]s, outermost first.
//! [`wrap`] is the only place where stages are attached to a router, so the
//! order a request sees is exactly the order listed here:
//!
//! ```text
//! standard:  recover panic -> log request -> security headers
//! dynamic:   load and save session -> CSRF guard -> authenticate
//! protected: dynamic -> require authentication
//! ```
//!
//! The standard chain wraps the whole router, fallback included. The dynamic
//! and protected chains are attached as route layers, so they only run for
//! routes that matched.

use super::{
    authenticate, csrf_guard, log_request, recover_panic, require_authentication,
    SecurityHeadersLayer, SessionLayer,
};
use crate::state::AppState;
use axum::{
    extract::Request,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::Route,
    Router,
};
use std::convert::Infallible;
use tower::{Layer, Service};

/// One interceptor in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Turn panics into 500 responses
    RecoverPanic,
    /// Log the request and open the request span
    LogRequest,
    /// Set the browser security headers
    SecurityHeaders,
    /// Load the session before the handler, commit it after
    LoadAndSave,
    /// Enforce CSRF tokens on unsafe methods
    CsrfGuard,
    /// Derive the authentication status
    Authenticate,
    /// Redirect anonymous requests to the login page
    RequireAuthentication,
}

/// The chains routes can be wrapped in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// Applied to every response
    Standard,
    /// Session, CSRF and authentication aware routes
    Dynamic,
    /// Dynamic routes that require a logged-in user
    Protected,
}

impl Chain {
    /// Stages of this chain, outermost first
    #[must_use]
    pub const fn stages(self) -> &'static [Stage] {
        match self {
            Self::Standard => &[Stage::RecoverPanic, Stage::LogRequest, Stage::SecurityHeaders],
            Self::Dynamic => &[Stage::LoadAndSave, Stage::CsrfGuard, Stage::Authenticate],
            Self::Protected => &[
                Stage::LoadAndSave,
                Stage::CsrfGuard,
                Stage::Authenticate,
                Stage::RequireAuthentication,
            ],
        }
    }

    const fn route_scoped(self) -> bool {
        !matches!(self, Self::Standard)
    }
}

/// Wrap `router` in `chain`
///
/// Axum runs the last attached layer first, so stages are attached in
/// reverse.
pub fn wrap(router: Router<AppState>, chain: Chain, state: &AppState) -> Router<AppState> {
    let route_scoped = chain.route_scoped();
    chain
        .stages()
        .iter()
        .rev()
        .fold(router, |router, stage| stage.attach(router, state, route_scoped))
}

impl Stage {
    fn attach(self, router: Router<AppState>, state: &AppState, route_scoped: bool) -> Router<AppState> {
        match self {
            Self::RecoverPanic => attach(router, from_fn(recover_panic), route_scoped),
            Self::LogRequest => attach(router, from_fn(log_request), route_scoped),
            Self::SecurityHeaders => attach(router, SecurityHeadersLayer::new(), route_scoped),
            Self::LoadAndSave => attach(
                router,
                SessionLayer::new(state.sessions.clone(), state.session_config.clone()),
                route_scoped,
            ),
            Self::CsrfGuard => attach(router, from_fn(csrf_guard), route_scoped),
            Self::Authenticate => {
                attach(router, from_fn_with_state(state.clone(), authenticate), route_scoped)
            }
            Self::RequireAuthentication => {
                attach(router, from_fn(require_authentication), route_scoped)
            }
        }
    }
}

fn attach<L>(router: Router<AppState>, layer: L, route_scoped: bool) -> Router<AppState>
where
    L: Layer<Route> + Clone + Send + Sync + 'static,
    L::Service: Service<Request> + Clone + Send + Sync + 'static,
    <L::Service as Service<Request>>::Response: IntoResponse + 'static,
    <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
    <L::Service as Service<Request>>::Future: Send + 'static,
{
    if route_scoped {
        router.route_layer(layer)
    } else {
        router.layer(layer)
    }
}
