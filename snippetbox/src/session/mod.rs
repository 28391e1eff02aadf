//! Server-side sessions
//!
//! A [`Session`] is the per-request view of one stored session. It is created
//! by the session middleware, shared with handlers through request extensions,
//! and written back by the middleware once the handler has finished, but only
//! if something changed.
//!
//! Sessions are created lazily: a request without a cookie gets an empty,
//! tokenless session that only receives a token (and a cookie) when a value is
//! first written.

pub mod store;

pub use store::{generate_token, spawn_cleanup_task, MemoryStore, SessionRecord, SessionStore};

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Well-known session keys
pub mod keys {
    /// Id of the logged-in user
    pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";
    /// One-shot message shown after a redirect
    pub const FLASH: &str = "flash";
    /// Where to send the user after logging in
    pub const REDIRECT_PATH_AFTER_LOGIN: &str = "redirectPathAfterLogin";
    /// Per-session CSRF secret
    pub const CSRF_SECRET: &str = "csrfSecret";
}

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Value could not be converted to or from JSON
    #[error("session value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend failure
    #[error("session store failure: {0}")]
    Store(String),
}

/// Whether the session has to be written back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Nothing changed during this request
    Unmodified,
    /// Values changed or the token was renewed
    Modified,
    /// The session was destroyed
    Destroyed,
}

#[derive(Debug)]
struct State {
    token: Option<String>,
    values: HashMap<String, serde_json::Value>,
    expires_at: DateTime<Utc>,
    status: Status,
}

impl State {
    fn touch(&mut self) {
        if self.status != Status::Destroyed {
            self.status = Status::Modified;
        }
    }
}

/// What the middleware must do with the session cookie after commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieAction {
    /// Leave the client cookie alone
    Keep,
    /// Issue this token, valid until the given instant
    Set {
        /// Token value
        token: String,
        /// Absolute expiry of the session
        expires_at: DateTime<Utc>,
    },
    /// Expire the client cookie
    Clear,
}

/// Per-request session handle
///
/// Cloning is cheap and every clone sees the same state.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<State>>,
    store: Arc<dyn SessionStore>,
    lifetime: chrono::Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Session")
            .field("has_token", &state.token.is_some())
            .field("keys", &state.values.keys().collect::<Vec<_>>())
            .field("status", &state.status)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Load the session for `token`, or start an empty one
    ///
    /// A token that does not resolve to a live record is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn load(
        store: Arc<dyn SessionStore>,
        token: Option<&str>,
        lifetime: chrono::Duration,
    ) -> Result<Self, SessionError> {
        let record = match token {
            Some(token) => store.load(token).await?.map(|record| (token.to_string(), record)),
            None => None,
        };

        let state = match record {
            Some((token, record)) => State {
                token: Some(token),
                values: record.values,
                expires_at: record.expires_at,
                status: Status::Unmodified,
            },
            None => State {
                token: None,
                values: HashMap::new(),
                expires_at: Utc::now() + lifetime,
                status: Status::Unmodified,
            },
        };

        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            store,
            lifetime,
        })
    }

    /// Current token, if the session has been persisted
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    /// Current write-back status
    #[must_use]
    pub fn status(&self) -> Status {
        self.state.lock().status
    }

    /// Get a typed value
    ///
    /// Values that do not deserialize into `T` are treated as absent.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.state.lock();
        state
            .values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Integer value, `0` when absent
    #[must_use]
    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).unwrap_or_default()
    }

    /// String value, empty when absent
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }

    /// Check whether `key` holds a value
    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.state.lock().values.contains_key(key)
    }

    /// Store a value, marking the session for write-back
    ///
    /// # Errors
    ///
    /// Returns error if value cannot be serialized
    pub fn put<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        let mut state = self.state.lock();
        state.values.insert(key.to_string(), value);
        state.touch();
        Ok(())
    }

    /// Get a typed value and delete it
    pub fn pop<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut state = self.state.lock();
        let value = state.values.remove(key)?;
        state.touch();
        serde_json::from_value(value).ok()
    }

    /// String value removed on read, empty when absent
    pub fn pop_string(&self, key: &str) -> String {
        self.pop(key).unwrap_or_default()
    }

    /// Delete a value; a no-op for absent keys
    pub fn remove(&self, key: &str) {
        let mut state = self.state.lock();
        if state.values.remove(key).is_some() {
            state.touch();
        }
    }

    /// Replace the session token, keeping the data
    ///
    /// The old token is invalidated immediately and the data is stored under
    /// the fresh token, so a token observed before a privilege change is
    /// useless afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn renew_token(&self) -> Result<(), SessionError> {
        let new_token = generate_token();
        let (old_token, record) = {
            let mut state = self.state.lock();
            let old = state.token.replace(new_token.clone());
            state.status = Status::Modified;
            (
                old,
                SessionRecord {
                    values: state.values.clone(),
                    expires_at: state.expires_at,
                },
            )
        };

        if let Some(old) = old_token {
            self.store.delete(&old).await?;
        }
        self.store.save(&new_token, &record).await
    }

    /// Delete the session and all its values
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn destroy(&self) -> Result<(), SessionError> {
        let old_token = {
            let mut state = self.state.lock();
            state.values.clear();
            state.status = Status::Destroyed;
            state.token.take()
        };

        if let Some(old) = old_token {
            self.store.delete(&old).await?;
        }
        Ok(())
    }

    /// Write the session back if needed
    ///
    /// A session that already had a token is only updated in place. When
    /// another request renewed or destroyed it in the meantime, the changes
    /// are dropped and the cookie is left alone, so the old token stays dead.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn commit(&self) -> Result<CookieAction, SessionError> {
        let pending = {
            let mut state = self.state.lock();
            match state.status {
                Status::Unmodified => None,
                Status::Destroyed => Some(None),
                Status::Modified => {
                    let fresh = state.token.is_none();
                    if fresh {
                        state.token = Some(generate_token());
                        state.expires_at = Utc::now() + self.lifetime;
                    }
                    let token = state.token.clone().unwrap_or_default();
                    Some(Some((
                        token,
                        SessionRecord {
                            values: state.values.clone(),
                            expires_at: state.expires_at,
                        },
                        fresh,
                    )))
                }
            }
        };

        match pending {
            None => Ok(CookieAction::Keep),
            Some(None) => Ok(CookieAction::Clear),
            Some(Some((token, record, true))) => {
                self.store.save(&token, &record).await?;
                Ok(CookieAction::Set {
                    token,
                    expires_at: record.expires_at,
                })
            }
            Some(Some((token, record, false))) => {
                if self.store.update(&token, &record).await? {
                    Ok(CookieAction::Set {
                        token,
                        expires_at: record.expires_at,
                    })
                } else {
                    tracing::warn!("session replaced by a concurrent request, dropping changes");
                    self.state.lock().token = None;
                    Ok(CookieAction::Keep)
                }
            }
        }
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Session not initialized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    async fn fresh(store: &Arc<MemoryStore>) -> Session {
        Session::load(store.clone(), None, chrono::Duration::hours(12))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_untouched_session_is_not_persisted() {
        let store = store();
        let session = fresh(&store).await;
        assert_eq!(session.get_int(keys::AUTHENTICATED_USER_ID), 0);
        assert_eq!(session.commit().await.unwrap(), CookieAction::Keep);
        assert!(store.is_empty());
        assert!(session.token().is_none());
    }

    #[tokio::test]
    async fn test_first_write_creates_session() {
        let store = store();
        let session = fresh(&store).await;
        session.put(keys::FLASH, "hello").unwrap();

        let action = session.commit().await.unwrap();
        let CookieAction::Set { token, .. } = action else {
            panic!("expected a cookie, got {action:?}");
        };
        assert_eq!(store.len(), 1);

        let reloaded = Session::load(store.clone(), Some(&token), chrono::Duration::hours(12))
            .await
            .unwrap();
        assert_eq!(reloaded.get_string(keys::FLASH), "hello");
    }

    #[tokio::test]
    async fn test_pop_string_is_one_shot() {
        let store = store();
        let session = fresh(&store).await;
        session.put(keys::FLASH, "saved").unwrap();

        assert_eq!(session.pop_string(keys::FLASH), "saved");
        assert_eq!(session.pop_string(keys::FLASH), "");
        assert!(!session.exists(keys::FLASH));
    }

    #[tokio::test]
    async fn test_typed_values() {
        let store = store();
        let session = fresh(&store).await;
        session.put(keys::AUTHENTICATED_USER_ID, 42_i64).unwrap();

        assert_eq!(session.get_int(keys::AUTHENTICATED_USER_ID), 42);
        assert_eq!(session.get::<i64>(keys::AUTHENTICATED_USER_ID), Some(42));
        // wrong type reads as absent
        assert_eq!(session.get_string(keys::AUTHENTICATED_USER_ID), "");
    }

    #[tokio::test]
    async fn test_remove_absent_key_does_not_dirty() {
        let store = store();
        let session = fresh(&store).await;
        session.remove("nothing");
        assert_eq!(session.status(), Status::Unmodified);
    }

    #[tokio::test]
    async fn test_renew_token_migrates_data() {
        let store = store();
        let session = fresh(&store).await;
        session.put(keys::AUTHENTICATED_USER_ID, 7_i64).unwrap();
        session.put(keys::FLASH, "hi").unwrap();
        let CookieAction::Set { token: old, .. } = session.commit().await.unwrap() else {
            panic!("expected a cookie");
        };

        let session = Session::load(store.clone(), Some(&old), chrono::Duration::hours(12))
            .await
            .unwrap();
        session.renew_token().await.unwrap();
        let new = session.token().unwrap();
        assert_ne!(old, new);

        assert!(store.load(&old).await.unwrap().is_none());
        let record = store.load(&new).await.unwrap().unwrap();
        assert_eq!(record.values[keys::AUTHENTICATED_USER_ID], serde_json::json!(7));
        assert_eq!(record.values[keys::FLASH], serde_json::json!("hi"));

        assert_eq!(
            session.commit().await.unwrap(),
            CookieAction::Set {
                token: new,
                expires_at: record.expires_at
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_commit_cannot_revive_renewed_token() {
        let store = store();
        let session = fresh(&store).await;
        session.put(keys::AUTHENTICATED_USER_ID, 7_i64).unwrap();
        session.put(keys::FLASH, "bye").unwrap();
        let CookieAction::Set { token: old, .. } = session.commit().await.unwrap() else {
            panic!("expected a cookie");
        };

        // two requests in flight on the same cookie
        let logout = Session::load(store.clone(), Some(&old), chrono::Duration::hours(12))
            .await
            .unwrap();
        let other = Session::load(store.clone(), Some(&old), chrono::Duration::hours(12))
            .await
            .unwrap();

        logout.renew_token().await.unwrap();
        logout.remove(keys::AUTHENTICATED_USER_ID);
        let CookieAction::Set { token: new, .. } = logout.commit().await.unwrap() else {
            panic!("expected a cookie");
        };

        assert_eq!(other.pop_string(keys::FLASH), "bye");
        assert_eq!(other.commit().await.unwrap(), CookieAction::Keep);

        assert!(store.load(&old).await.unwrap().is_none());
        let record = store.load(&new).await.unwrap().unwrap();
        assert!(!record.values.contains_key(keys::AUTHENTICATED_USER_ID));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_after_destroy_elsewhere_is_dropped() {
        let store = store();
        let session = fresh(&store).await;
        session.put("k", "v").unwrap();
        let CookieAction::Set { token, .. } = session.commit().await.unwrap() else {
            panic!("expected a cookie");
        };

        let late = Session::load(store.clone(), Some(&token), chrono::Duration::hours(1))
            .await
            .unwrap();
        store.delete(&token).await.unwrap();

        late.put("k", "changed").unwrap();
        assert_eq!(late.commit().await.unwrap(), CookieAction::Keep);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_renew_keeps_absolute_expiry() {
        let store = store();
        let session = fresh(&store).await;
        session.put("k", 1).unwrap();
        let CookieAction::Set { token, expires_at } = session.commit().await.unwrap() else {
            panic!("expected a cookie");
        };

        let session = Session::load(store.clone(), Some(&token), chrono::Duration::hours(12))
            .await
            .unwrap();
        session.renew_token().await.unwrap();
        let CookieAction::Set { expires_at: renewed, .. } = session.commit().await.unwrap() else {
            panic!("expected a cookie");
        };
        assert_eq!(expires_at, renewed);
    }

    #[tokio::test]
    async fn test_unknown_token_starts_empty_session() {
        let store = store();
        let session = Session::load(store.clone(), Some("forged"), chrono::Duration::hours(1))
            .await
            .unwrap();
        assert!(session.token().is_none());
        session.put("k", "v").unwrap();
        let CookieAction::Set { token, .. } = session.commit().await.unwrap() else {
            panic!("expected a cookie");
        };
        assert_ne!(token, "forged");
    }

    #[tokio::test]
    async fn test_destroy() {
        let store = store();
        let session = fresh(&store).await;
        session.put("k", "v").unwrap();
        let CookieAction::Set { token, .. } = session.commit().await.unwrap() else {
            panic!("expected a cookie");
        };

        let session = Session::load(store.clone(), Some(&token), chrono::Duration::hours(1))
            .await
            .unwrap();
        session.destroy().await.unwrap();
        session.put("ignored", 1).unwrap();

        assert_eq!(session.commit().await.unwrap(), CookieAction::Clear);
        assert!(store.is_empty());
    }
}
