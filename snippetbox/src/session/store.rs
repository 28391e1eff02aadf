//! Session storage backends
//!
//! A store maps opaque tokens to [`SessionRecord`]s. The in-memory backend
//! keeps records in a sharded concurrent map, so requests for different tokens
//! never contend on a single lock.

use super::SessionError;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Number of random bytes in a session token
pub const TOKEN_BYTES: usize = 32;

/// Generate an unguessable URL-safe session token
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Persisted state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Named session values
    pub values: HashMap<String, serde_json::Value>,
    /// Absolute expiry; the record is dead afterwards
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Empty record that expires at `expires_at`
    #[must_use]
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            values: HashMap::new(),
            expires_at,
        }
    }

    /// Check if the record has expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Session storage backend
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Load a live record by token
    ///
    /// Returns `Ok(None)` if the token is unknown or the record has expired.
    async fn load(&self, token: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Insert or replace the record for `token`
    async fn save(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError>;

    /// Replace the record for `token` only while it is still live
    ///
    /// Returns `false` when the token is unknown or expired. A token that was
    /// renewed or destroyed by another request must stay dead, so it is never
    /// inserted again.
    async fn update(&self, token: &str, record: &SessionRecord) -> Result<bool, SessionError>;

    /// Remove the record for `token`; unknown tokens are not an error
    async fn delete(&self, token: &str) -> Result<(), SessionError>;

    /// Drop every expired record, returning how many were removed
    async fn cleanup_expired(&self) -> Result<usize, SessionError>;
}

/// In-memory session store
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, SessionRecord>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no records are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        let record = self.sessions.get(token).map(|entry| entry.value().clone());
        match record {
            Some(record) if record.is_expired() => {
                self.sessions.remove_if(token, |_, r| r.is_expired());
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn save(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError> {
        self.sessions.insert(token.to_string(), record.clone());
        Ok(())
    }

    async fn update(&self, token: &str, record: &SessionRecord) -> Result<bool, SessionError> {
        // the shard lock is held from the liveness check to the write
        match self.sessions.get_mut(token) {
            Some(mut entry) if !entry.is_expired() => {
                *entry = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        self.sessions.remove(token);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize, SessionError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, record| !record.is_expired());
        Ok(before.saturating_sub(self.sessions.len()))
    }
}

/// Spawn the periodic reaper for expired sessions
///
/// The task runs until the returned handle is aborted, which the binary does
/// during shutdown.
pub fn spawn_cleanup_task(store: Arc<dyn SessionStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "reaped expired sessions"),
                Err(err) => tracing::warn!(error = %err, "session cleanup failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_record() -> SessionRecord {
        SessionRecord::new(Utc::now() + chrono::Duration::hours(1))
    }

    #[test]
    fn test_tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32 bytes -> 43 characters without padding
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStore::new();
        let mut record = live_record();
        record
            .values
            .insert("flash".into(), serde_json::json!("hello"));

        store.save("tok", &record).await.unwrap();
        let loaded = store.load("tok").await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_unknown_token_loads_nothing() {
        let store = MemoryStore::new();
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_record_is_not_loaded() {
        let store = MemoryStore::new();
        let record = SessionRecord::new(Utc::now() - chrono::Duration::seconds(1));
        store.save("old", &record).await.unwrap();

        assert!(store.load("old").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.save("tok", &live_record()).await.unwrap();
        store.delete("tok").await.unwrap();
        assert!(store.load("tok").await.unwrap().is_none());
        store.delete("tok").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_only_touches_live_records() {
        let store = MemoryStore::new();
        let mut record = live_record();
        record.values.insert("k".into(), serde_json::json!(1));

        assert!(!store.update("missing", &record).await.unwrap());
        assert!(store.is_empty());

        store.save("tok", &live_record()).await.unwrap();
        assert!(store.update("tok", &record).await.unwrap());
        assert_eq!(store.load("tok").await.unwrap(), Some(record.clone()));

        store.delete("tok").await.unwrap();
        assert!(!store.update("tok", &record).await.unwrap());
        assert!(store.load("tok").await.unwrap().is_none());

        let dead = SessionRecord::new(Utc::now() - chrono::Duration::seconds(1));
        store.save("dead", &dead).await.unwrap();
        assert!(!store.update("dead", &record).await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = MemoryStore::new();
        let dead = SessionRecord::new(Utc::now() - chrono::Duration::seconds(1));
        for i in 0..5 {
            store.save(&format!("dead{i}"), &dead).await.unwrap();
        }
        store.save("live", &live_record()).await.unwrap();

        let removed = store.cleanup_expired().await.unwrap();
        assert_eq!(removed, 5);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_reaps() {
        let store = Arc::new(MemoryStore::new());
        let dead = SessionRecord::new(Utc::now() - chrono::Duration::seconds(1));
        store.save("dead", &dead).await.unwrap();

        let handle = spawn_cleanup_task(store.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(store.is_empty());
        handle.abort();
    }
}
