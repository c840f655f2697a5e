//! Session Store (spec §4.3): in-memory store of `WebSession`s, with
//! secondary lookup by SOL/VNC session id and a background janitor.
//!
//! Generalizes the teacher's `AgentState` pattern of several
//! `RwLock`-wrapped `HashMap`s (`client/src-tauri/src/state.rs`) into one
//! store guarded by a single read/write lock, since `get` here must
//! atomically check expiry against the map contents (spec §5: "guarded by
//! a single read/write lock; readers take the read lock").

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct WebSession {
    pub id: String,
    pub customer_jwt: String,
    pub sol_session_id: Option<String>,
    pub vnc_session_id: Option<String>,
    pub customer_id: String,
    pub server_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token_expires_at: DateTime<Utc>,
    pub token_renewal_at: DateTime<Utc>,
}

impl WebSession {
    /// `token_renewal_at` defaults to 80% of the remaining JWT lifetime
    /// from `created_at` (spec §3).
    pub fn new(customer_jwt: String, customer_id: String, server_id: String, cookie_ttl: Duration, token_expires_at: DateTime<Utc>) -> Self {
        let created_at = Utc::now();
        let remaining = token_expires_at - created_at;
        let renewal_offset = Duration::milliseconds((remaining.num_milliseconds() as f64 * 0.8) as i64);
        Self {
            id: generate_session_id(),
            customer_jwt,
            sol_session_id: None,
            vnc_session_id: None,
            customer_id,
            server_id,
            created_at,
            last_activity_at: created_at,
            expires_at: created_at + cookie_ttl,
            token_expires_at,
            token_renewal_at: created_at + renewal_offset,
        }
    }
}

/// 256-bit random, base64url-encoded session id (spec §3).
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session not found")]
    NotFound,
    #[error("session expired")]
    Expired,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, WebSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, session: WebSession) -> String {
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        id
    }

    pub async fn get(&self, id: &str) -> Result<WebSession, SessionStoreError> {
        let sessions = self.sessions.read().await;
        match sessions.get(id) {
            None => Err(SessionStoreError::NotFound),
            Some(s) if s.expires_at <= Utc::now() => Err(SessionStoreError::Expired),
            Some(s) => Ok(s.clone()),
        }
    }

    pub async fn update(&self, session: WebSession) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    pub async fn delete(&self, id: &str) -> Option<WebSession> {
        self.sessions.write().await.remove(id)
    }

    pub async fn update_activity(&self, id: &str) {
        if let Some(s) = self.sessions.write().await.get_mut(id) {
            s.last_activity_at = Utc::now();
        }
    }

    pub async fn get_by_sol_session_id(&self, sol_id: &str) -> Result<WebSession, SessionStoreError> {
        let sessions = self.sessions.read().await;
        match sessions.values().find(|s| s.sol_session_id.as_deref() == Some(sol_id)) {
            None => Err(SessionStoreError::NotFound),
            Some(s) if s.expires_at <= Utc::now() => Err(SessionStoreError::Expired),
            Some(s) => Ok(s.clone()),
        }
    }

    pub async fn get_by_vnc_session_id(&self, vnc_id: &str) -> Result<WebSession, SessionStoreError> {
        let sessions = self.sessions.read().await;
        match sessions.values().find(|s| s.vnc_session_id.as_deref() == Some(vnc_id)) {
            None => Err(SessionStoreError::NotFound),
            Some(s) if s.expires_at <= Utc::now() => Err(SessionStoreError::Expired),
            Some(s) => Ok(s.clone()),
        }
    }

    /// Past 80% of token lifetime, not yet expired (spec §7).
    pub async fn get_sessions_needing_renewal(&self) -> Vec<WebSession> {
        let now = Utc::now();
        self.sessions.read().await.values().filter(|s| s.token_renewal_at <= now && s.token_expires_at > now).cloned().collect()
    }

    pub async fn delete_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ttl: Duration) -> WebSession {
        WebSession::new("jwt".into(), "cust1".into(), "srv1".into(), ttl, Utc::now() + Duration::hours(1))
    }

    #[tokio::test]
    async fn secondary_lookups_return_the_same_session_create_stored() {
        let store = SessionStore::new();
        let mut session = sample(Duration::hours(1));
        session.sol_session_id = Some("sol-1".into());
        session.vnc_session_id = Some("vnc-1".into());
        let id = store.create(session.clone()).await;

        let by_sol = store.get_by_sol_session_id("sol-1").await.unwrap();
        let by_vnc = store.get_by_vnc_session_id("vnc-1").await.unwrap();
        assert_eq!(by_sol.id, id);
        assert_eq!(by_vnc.id, id);
    }

    #[tokio::test]
    async fn expired_session_reports_expired_on_all_lookups() {
        let store = SessionStore::new();
        let mut session = sample(Duration::milliseconds(-1));
        session.sol_session_id = Some("sol-1".into());
        store.create(session).await;
        assert_eq!(store.get_by_sol_session_id("sol-1").await, Err(SessionStoreError::Expired));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = SessionStore::new();
        assert_eq!(store.get("nope").await, Err(SessionStoreError::NotFound));
    }

    #[tokio::test]
    async fn delete_expired_sweeps_only_expired_entries() {
        let store = SessionStore::new();
        store.create(sample(Duration::milliseconds(-1))).await;
        store.create(sample(Duration::hours(1))).await;
        let removed = store.delete_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn renewal_threshold_is_eighty_percent_of_token_lifetime() {
        let session = WebSession::new("jwt".into(), "c".into(), "s".into(), Duration::hours(2), Utc::now() + Duration::seconds(100));
        let remaining_at_creation = (session.token_renewal_at - session.created_at).num_milliseconds();
        assert!((remaining_at_creation - 80_000).abs() < 200);
    }
}
