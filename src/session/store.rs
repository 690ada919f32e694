use std::collections::HashMap;

use axum::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use parking_lot::RwLock;
use rand::RngCore;

use super::Session;

/// 256-bit random token, base64url. Used for both session keys and CSRF
/// tokens.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Session persistence seam. The in-memory implementation is process-local:
/// with more than one instance this has to move to a shared store, same as
/// the rate-limit buckets.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, token: &str) -> Option<Session>;
    async fn save(&self, session: Session);
    async fn destroy(&self, token: &str);
}

/// Expired entries are dropped on load and swept on every save, so the map
/// stays bounded by the sessions issued within one TTL window.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, token: &str) -> Option<Session> {
        let now = time::OffsetDateTime::now_utc();
        let mut sessions = self.sessions.write();
        match sessions.get(token) {
            Some(s) if !s.is_expired(now) => Some(s.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    async fn save(&self, session: Session) {
        let now = time::OffsetDateTime::now_utc();
        let mut sessions = self.sessions.write();
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(session.token.clone(), session);
    }

    async fn destroy(&self, token: &str) {
        self.sessions.write().remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        // 32 bytes of entropy, well above the 128-bit floor.
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), 32);
    }

    #[tokio::test]
    async fn save_load_destroy_lifecycle() {
        let store = MemorySessionStore::default();
        let session = Session::anonymous();
        let token = session.token.clone();

        store.save(session).await;
        assert!(store.load(&token).await.is_some());

        store.destroy(&token).await;
        assert!(store.load(&token).await.is_none());
    }

    #[tokio::test]
    async fn load_of_unknown_token_is_none() {
        let store = MemorySessionStore::default();
        assert!(store.load("missing").await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_not_loaded() {
        let store = MemorySessionStore::default();
        let mut session = Session::anonymous();
        session.issued_at -= crate::session::SESSION_TTL;
        let token = session.token.clone();

        store.save(session).await;
        assert!(store.load(&token).await.is_none());
    }

    #[tokio::test]
    async fn save_sweeps_expired_entries() {
        let store = MemorySessionStore::default();
        let mut stale = Session::anonymous();
        stale.issued_at -= crate::session::SESSION_TTL;
        let stale_token = stale.token.clone();
        store.save(stale).await;

        store.save(Session::anonymous()).await;
        assert!(store.sessions.read().get(&stale_token).is_none());
    }
}
