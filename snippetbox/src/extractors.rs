//! Handler extractors
//!
//! [`RequestContext`] bundles what the dynamic chain put into the request
//! extensions, so handlers take one argument instead of three.

use crate::csrf::CsrfToken;
use crate::middleware::AuthStatus;
use crate::session::{keys, Session};
use crate::templates::TemplateData;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use chrono::{Datelike, Utc};

/// Per-request context for handlers behind the dynamic chain
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request session
    pub session: Session,
    /// Authentication status
    pub auth: AuthStatus,
    /// Masked CSRF token for rendered forms
    pub csrf_token: CsrfToken,
}

impl RequestContext {
    /// Base data for a page
    ///
    /// Pops the flash message, so it is shown exactly once.
    #[must_use]
    pub fn template_data(&self) -> TemplateData {
        TemplateData {
            current_year: Utc::now().year(),
            flash: self.session.pop_string(keys::FLASH),
            is_authenticated: self.auth.is_authenticated(),
            csrf_token: self.csrf_token.as_str().to_string(),
            ..TemplateData::default()
        }
    }

    /// Id of the logged-in user, `0` when anonymous
    #[must_use]
    pub fn user_id(&self) -> i64 {
        self.session.get_int(keys::AUTHENTICATED_USER_ID)
    }

    /// Queue a one-shot message for the next page
    ///
    /// # Errors
    ///
    /// Returns an error if the session value cannot be stored.
    pub fn flash(&self, message: &str) -> Result<(), crate::session::SessionError> {
        self.session.put(keys::FLASH, message)
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let csrf_token = CsrfToken::from_request_parts(parts, state).await?;
        let auth = parts.extensions.get::<AuthStatus>().copied().unwrap_or_default();

        Ok(Self {
            session,
            auth,
            csrf_token,
        })
    }
}
