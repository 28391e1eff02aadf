//! Session middleware
//!
//! Loads the session named by the request cookie before the inner service
//! runs, exposes it to handlers through request extensions, and commits it
//! afterwards, issuing or clearing the cookie when the session changed.

use crate::error::server_error;
use crate::session::{CookieAction, Session, SessionStore};
use axum::{
    body::Body,
    extract::Request,
    http::{
        header::{CACHE_CONTROL, COOKIE, SET_COOKIE, VARY},
        HeaderValue,
    },
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Default session cookie name
pub const SESSION_COOKIE_NAME: &str = "session";

/// Longest accepted session lifetime, ten years
pub const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Session cookie and lifetime settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name for the session token
    pub cookie_name: String,
    /// Cookie path
    pub cookie_path: String,
    /// HTTP-only cookie
    pub http_only: bool,
    /// Secure cookie (HTTPS only)
    pub secure: bool,
    /// SameSite policy
    pub same_site: SameSite,
    /// Absolute session lifetime in seconds
    pub lifetime_secs: u64,
    /// Interval between expired-session sweeps in seconds
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: SESSION_COOKIE_NAME.to_string(),
            cookie_path: "/".to_string(),
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
            lifetime_secs: 12 * 60 * 60,
            cleanup_interval_secs: 5 * 60,
        }
    }
}

impl SessionConfig {
    /// Session lifetime as a chrono duration, clamped to [`MAX_LIFETIME_SECS`]
    #[must_use]
    pub fn lifetime(&self) -> chrono::Duration {
        i64::try_from(self.lifetime_secs.min(MAX_LIFETIME_SECS))
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(chrono::Duration::zero)
    }

    /// Check the settings that cannot be represented or would stall the reaper
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.lifetime_secs == 0 || self.lifetime_secs > MAX_LIFETIME_SECS {
            return Err(format!(
                "session.lifetime_secs must be between 1 and {MAX_LIFETIME_SECS}, got {}",
                self.lifetime_secs
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err("session.cleanup_interval_secs must be positive".to_string());
        }
        if self.same_site == SameSite::None && !self.secure {
            return Err("session.same_site = \"none\" requires session.secure".to_string());
        }
        Ok(())
    }
}

/// SameSite cookie policy
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// Strict same-site policy
    Strict,
    /// Lax same-site policy
    #[default]
    Lax,
    /// No same-site restriction (requires Secure)
    None,
}

impl SameSite {
    /// Convert to cookie attribute string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Layer for session middleware
#[derive(Clone)]
pub struct SessionLayer {
    config: Arc<SessionConfig>,
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for SessionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLayer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionLayer {
    /// Create a session layer over `store`
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionMiddleware {
            inner,
            config: self.config.clone(),
            store: self.store.clone(),
        }
    }
}

/// Session middleware that loads and saves cookie-based sessions
#[derive(Clone)]
pub struct SessionMiddleware<S> {
    inner: S,
    config: Arc<SessionConfig>,
    store: Arc<dyn SessionStore>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for SessionMiddleware<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request> for SessionMiddleware<S>
where
    S: Service<Request, Response = Response<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let config = self.config.clone();
        let store = self.store.clone();
        // take the service that was driven to readiness, leave a clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let token = extract_session_token(&req, &config.cookie_name);
            let session = match Session::load(store, token.as_deref(), config.lifetime()).await {
                Ok(session) => session,
                Err(err) => return Ok(server_error(&err)),
            };

            req.extensions_mut().insert(session.clone());
            let mut response = inner.call(req).await?;

            match session.commit().await {
                Ok(CookieAction::Keep) => {}
                Ok(CookieAction::Set { token, expires_at }) => {
                    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
                    set_session_cookie(&mut response, &config, &token, max_age);
                }
                Ok(CookieAction::Clear) => {
                    set_session_cookie(&mut response, &config, "", 0);
                }
                Err(err) => return Ok(server_error(&err)),
            }

            Ok(response)
        })
    }
}

/// Extract the session token from request cookies
fn extract_session_token(req: &Request, cookie_name: &str) -> Option<String> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| name.trim() == cookie_name && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}

/// Set the session cookie on the response
///
/// Responses that carry a session cookie must not be cached by shared caches.
fn set_session_cookie(response: &mut Response<Body>, config: &SessionConfig, token: &str, max_age: i64) {
    let mut cookie_value = format!(
        "{}={}; Path={}; Max-Age={}; SameSite={}",
        config.cookie_name,
        token,
        config.cookie_path,
        max_age,
        config.same_site.as_str()
    );

    if config.http_only {
        cookie_value.push_str("; HttpOnly");
    }

    if config.secure {
        cookie_value.push_str("; Secure");
    }

    let headers = response.headers_mut();
    if let Ok(header_value) = HeaderValue::from_str(&cookie_value) {
        headers.append(SET_COOKIE, header_value);
    }
    headers.append(VARY, HeaderValue::from_static("Cookie"));
    headers.append(CACHE_CONTROL, HeaderValue::from_static(r#"no-cache="Set-Cookie""#));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;
    use axum::http::StatusCode;
    use tower::ServiceExt;
    use axum::http::Request;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.cookie_name, SESSION_COOKIE_NAME);
        assert!(config.http_only);
        assert!(config.secure);
        assert_eq!(config.lifetime_secs, 43200);
    }

    #[test]
    fn test_lifetime_is_clamped() {
        let config = SessionConfig {
            lifetime_secs: u64::MAX,
            ..SessionConfig::default()
        };
        let lifetime = config.lifetime();
        assert_eq!(lifetime.num_seconds(), i64::try_from(MAX_LIFETIME_SECS).unwrap());
        assert!(Utc::now().checked_add_signed(lifetime).is_some());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(SessionConfig::default().validate().is_ok());
        let zero = SessionConfig {
            lifetime_secs: 0,
            ..SessionConfig::default()
        };
        assert!(zero.validate().is_err());
        let no_reaper = SessionConfig {
            cleanup_interval_secs: 0,
            ..SessionConfig::default()
        };
        assert!(no_reaper.validate().is_err());
    }

    #[test]
    fn test_same_site_as_str() {
        assert_eq!(SameSite::Strict.as_str(), "Strict");
        assert_eq!(SameSite::Lax.as_str(), "Lax");
        assert_eq!(SameSite::None.as_str(), "None");
    }

    #[test]
    fn test_extract_session_token() {
        let req = Request::builder()
            .header(COOKIE, "theme=dark; session=abc123 ; other=1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(&req, "session").as_deref(), Some("abc123"));
        assert_eq!(extract_session_token(&req, "missing"), None);
    }

    #[test]
    fn test_cookie_attributes() {
        let mut response = Response::new(Body::empty());
        set_session_cookie(&mut response, &SessionConfig::default(), "tok", 60);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert_eq!(
            cookie,
            "session=tok; Path=/; Max-Age=60; SameSite=Lax; HttpOnly; Secure"
        );
        assert_eq!(response.headers()[VARY], "Cookie");
    }

    #[tokio::test]
    async fn test_write_sets_cookie_and_read_does_not() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let layer = SessionLayer::new(store, SessionConfig::default());

        let writer = layer.layer(tower::service_fn(|req: Request<Body>| async move {
            let session = req.extensions().get::<Session>().cloned().unwrap();
            session.put("flash", "hi").unwrap();
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));
        let response = writer.oneshot(Request::new(Body::empty())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(SET_COOKIE));

        let reader = layer.layer(tower::service_fn(|req: Request<Body>| async move {
            let session = req.extensions().get::<Session>().cloned().unwrap();
            let _ = session.get_string("flash");
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));
        let response = reader.oneshot(Request::new(Body::empty())).await.unwrap();
        assert!(!response.headers().contains_key(SET_COOKIE));
    }
}
