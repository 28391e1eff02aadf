//! CSRF protection middleware
//!
//! Runs inside the session stage. Safe requests make sure the session has a
//! secret; unsafe requests must echo a masked token, either in the
//! `X-CSRF-Token` header or in the `csrf_token` form field. Every request that
//! passes gets a freshly masked [`CsrfToken`] in its extensions for templates.

use crate::csrf::{self, CsrfToken, FORM_FIELD, HEADER_NAME};
use crate::error::{server_error, status_page};
use crate::session::{keys, Session};
use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};

/// Largest form body buffered while looking for the token
pub const MAX_FORM_BYTES: usize = 1024 * 1024;

/// Methods that never change state and are exempt from token checks
#[must_use]
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Enforce the CSRF token on unsafe methods
pub async fn csrf_guard(session: Session, req: Request, next: Next) -> Response {
    let secret = match session.get_string(keys::CSRF_SECRET) {
        secret if !secret.is_empty() => secret,
        _ if is_safe_method(req.method()) => {
            let secret = csrf::generate_secret();
            if let Err(err) = session.put(keys::CSRF_SECRET, &secret) {
                return server_error(&err);
            }
            secret
        }
        _ => {
            tracing::warn!(method = %req.method(), uri = %req.uri(), "CSRF check failed: no secret in session");
            return status_page(StatusCode::BAD_REQUEST);
        }
    };

    let mut req = req;
    if !is_safe_method(req.method()) {
        let (submitted, rebuilt) = match submitted_token(req).await {
            Ok(found) => found,
            Err(response) => return response,
        };
        req = rebuilt;

        if !submitted.as_deref().is_some_and(|token| csrf::verify(&secret, token)) {
            tracing::warn!(
                method = %req.method(),
                uri = %req.uri(),
                token_present = submitted.is_some(),
                "CSRF check failed"
            );
            return status_page(StatusCode::BAD_REQUEST);
        }
    }

    let Some(masked) = csrf::mask(&secret) else {
        // the secret was written by us, so this only happens on a corrupted store
        tracing::error!("session CSRF secret is not valid base64");
        return status_page(StatusCode::INTERNAL_SERVER_ERROR);
    };
    req.extensions_mut().insert(CsrfToken(masked));

    next.run(req).await
}

/// Find the submitted token, buffering the body when it has to be read
///
/// The body is put back so the handler can still decode the form.
async fn submitted_token(req: Request) -> Result<(Option<String>, Request), Response> {
    if let Some(token) = req
        .headers()
        .get(HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
    {
        let token = token.to_string();
        return Ok((Some(token), req));
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES).await.map_err(|err| {
        tracing::debug!(error = %err, "could not buffer request body");
        status_page(StatusCode::BAD_REQUEST)
    })?;

    let token = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)
        .ok()
        .and_then(|pairs| {
            pairs
                .into_iter()
                .find(|(name, _)| name == FORM_FIELD)
                .map(|(_, value)| value)
        });

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}
