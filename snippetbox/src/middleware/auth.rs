//! Authentication middleware
//!
//! [`authenticate`] derives the request's [`AuthStatus`] once, from the user
//! id in the session and a liveness check against the user collaborator.
//! [`require_authentication`] turns anonymous requests for protected routes
//! into a redirect to the login page.

use crate::error::server_error;
use crate::session::{keys, Session};
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::CACHE_CONTROL, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::convert::Infallible;

/// Where anonymous users are sent
pub const LOGIN_PATH: &str = "/user/login";

/// Authentication state of the current request
///
/// Derived once by [`authenticate`] and never changed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthStatus(bool);

impl AuthStatus {
    /// Status for an authenticated request
    pub const AUTHENTICATED: Self = Self(true);
    /// Status for an anonymous request
    pub const ANONYMOUS: Self = Self(false);

    /// Whether the request belongs to a live user
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        self.0
    }
}

impl<S> FromRequestParts<S> for AuthStatus
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().copied().unwrap_or_default())
    }
}

/// Derive the authentication status for the request
///
/// A user id that no longer resolves to a user is dropped from the session.
pub async fn authenticate(
    State(state): State<AppState>,
    session: Session,
    mut req: Request,
    next: Next,
) -> Response {
    let id = session.get_int(keys::AUTHENTICATED_USER_ID);

    let status = if id == 0 {
        AuthStatus::ANONYMOUS
    } else {
        match state.users.exists(id).await {
            Ok(true) => AuthStatus::AUTHENTICATED,
            Ok(false) => {
                tracing::info!(user_id = id, "dropping stale user id from session");
                session.remove(keys::AUTHENTICATED_USER_ID);
                AuthStatus::ANONYMOUS
            }
            Err(err) => return server_error(&err),
        }
    };

    req.extensions_mut().insert(status);
    next.run(req).await
}

/// Redirect anonymous requests to the login page
///
/// The requested path is remembered so login can send the user back.
/// Authenticated responses are marked uncacheable.
pub async fn require_authentication(
    session: Session,
    status: AuthStatus,
    req: Request,
    next: Next,
) -> Response {
    if !status.is_authenticated() {
        if let Err(err) = session.put(keys::REDIRECT_PATH_AFTER_LOGIN, req.uri().path()) {
            return server_error(&err);
        }
        return Redirect::to(LOGIN_PATH).into_response();
    }

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
