//! CSRF secrets and masked tokens
//!
//! Each session carries one random secret. Pages never embed the secret
//! itself: every render gets a freshly masked token, `pad || (pad ^ secret)`,
//! so the value differs per response while still verifying against the same
//! secret.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use subtle::ConstantTimeEq;

/// Length of the per-session secret in bytes
pub const SECRET_BYTES: usize = 32;

/// Form field carrying the masked token
pub const FORM_FIELD: &str = "csrf_token";

/// Header carrying the masked token
pub const HEADER_NAME: &str = "X-CSRF-Token";

/// Generate a new base64-encoded secret
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Produce a masked token for `secret`
///
/// Returns `None` if the secret is not valid base64.
#[must_use]
pub fn mask(secret: &str) -> Option<String> {
    let secret = URL_SAFE_NO_PAD.decode(secret).ok()?;
    let mut pad = vec![0u8; secret.len()];
    rand::rng().fill(&mut pad[..]);

    let mut token = Vec::with_capacity(secret.len() * 2);
    token.extend_from_slice(&pad);
    token.extend(pad.iter().zip(&secret).map(|(p, s)| p ^ s));
    Some(URL_SAFE_NO_PAD.encode(token))
}

/// Check a submitted masked token against the session secret
#[must_use]
pub fn verify(secret: &str, submitted: &str) -> bool {
    let Ok(secret) = URL_SAFE_NO_PAD.decode(secret) else {
        return false;
    };
    let Ok(token) = URL_SAFE_NO_PAD.decode(submitted.trim()) else {
        return false;
    };

    if secret.is_empty() || token.len() != secret.len() * 2 {
        return false;
    }

    let (pad, masked) = token.split_at(secret.len());
    let unmasked: Vec<u8> = pad.iter().zip(masked).map(|(p, m)| p ^ m).collect();
    unmasked.ct_eq(&secret).into()
}

/// Masked token for the current request
///
/// Inserted by the CSRF middleware and embedded by templates as a hidden
/// field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl CsrfToken {
    /// Token value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "CSRF protection not initialized"))
    }
}
