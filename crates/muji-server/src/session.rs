//! Admin session registry.
//!
//! Sessions are opaque random tokens mapped to the authenticated subject.
//! The registry sits behind [`SessionStore`] so it can be moved out of
//! process without touching the handlers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// An authenticated admin session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Open a session for `subject` and return its token.
    async fn create(&self, subject: &str) -> String;

    /// Look a token up. Expired sessions are treated as absent.
    async fn validate(&self, token: &str) -> Option<Session>;

    /// Revoke a token; `false` if it was unknown.
    async fn revoke(&self, token: &str) -> bool;

    /// Drop expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> usize;
}

/// Process-local session registry with a fixed lifetime per session.
#[derive(Clone)]
pub struct InMemorySessionStore {
    ttl: Duration,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// 32 random bytes, hex-encoded.
fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, subject: &str) -> String {
        let token = new_token();
        let now = Utc::now();
        let session = Session {
            subject: subject.to_string(),
            created_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        self.sessions.write().await.insert(token.clone(), session);
        info!(subject, "Admin session opened");
        token
    }

    async fn validate(&self, token: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|session| session.is_live(Utc::now()))
            .cloned()
    }

    async fn revoke(&self, token: &str) -> bool {
        let removed = self.sessions.write().await.remove(token);
        if let Some(session) = &removed {
            info!(subject = %session.subject, "Admin session closed");
        }
        removed.is_some()
    }

    async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let now = Utc::now();
        sessions.retain(|_, session| session.is_live(now));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "Purged expired sessions");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_validate_revoke() {
        let store = InMemorySessionStore::new(Duration::hours(1));
        let token = store.create("admin").await;
        assert_eq!(token.len(), 64);

        let session = store.validate(&token).await.unwrap();
        assert_eq!(session.subject, "admin");

        assert!(store.revoke(&token).await);
        assert!(store.validate(&token).await.is_none());
        assert!(!store.revoke(&token).await);
    }

    #[tokio::test]
    async fn test_tokens_are_unique() {
        let store = InMemorySessionStore::new(Duration::hours(1));
        let a = store.create("admin").await;
        let b = store.create("admin").await;
        assert_ne!(a, b);
        assert!(store.validate("not-a-token").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions() {
        let store = InMemorySessionStore::new(Duration::seconds(-1));
        let token = store.create("admin").await;

        assert!(store.validate(&token).await.is_none());
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_ttl_saturates() {
        let store = InMemorySessionStore::new(Duration::weeks(15_000_000));
        let token = store.create("admin").await;

        let session = store.validate(&token).await.unwrap();
        assert_eq!(session.expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(store.purge_expired().await, 0);
    }
}
