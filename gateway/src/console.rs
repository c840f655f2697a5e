//! Console Session Manager (spec §4.4): creates SOL/VNC sessions bound to
//! (customer, server, agent), mints the browser-facing URLs, enforces TTL,
//! and tears them down.

use crate::registry::AgentRegistry;
use crate::session_store::{SessionStore, WebSession};
use async_trait::async_trait;
use bmc_proto::{AgentStatus, CustomerClaims, PlatformError, TokenService};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const SESSION_COOKIE_TTL_SECS: i64 = 3600;

/// Resolves where a server lives (spec §4.4 step 3: "Manager's
/// server->datacenter mapping"), abstracted behind a trait so the Gateway
/// can be exercised in tests without a real Manager RPC round trip.
#[async_trait]
pub trait ManagerClient: Send + Sync {
    async fn authorize_server_access(&self, customer_id: &str, server_id: &str) -> Result<ServerLocation, PlatformError>;
}

#[derive(Debug, Clone)]
pub struct ServerLocation {
    pub datacenter_id: String,
}

#[derive(Debug, Clone)]
pub struct SolSession {
    pub session_id: String,
    pub server_id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub viewer_url: String,
    pub websocket_url: String,
}

#[derive(Debug, Clone)]
pub struct VncSession {
    pub session_id: String,
    pub server_id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub viewer_url: String,
    pub websocket_url: String,
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: String,
    pub viewer_url: String,
    pub websocket_url: String,
    pub expires_at: DateTime<Utc>,
}

/// The stored credential is the customer JWT (24h lifetime, spec §4.1), so
/// `token_expires_at` must be the JWT's own `exp`, not the browser cookie's
/// TTL (spec §3: "token_expires_at" / "token_renewal_at" are both defined
/// against the JWT's lifetime).
fn customer_token_exp(claims: &CustomerClaims) -> Result<DateTime<Utc>, PlatformError> {
    DateTime::<Utc>::from_timestamp(claims.exp, 0).ok_or_else(|| PlatformError::InternalError("invalid token exp".into()))
}

fn generate_console_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

pub struct ConsoleSessionManager {
    agents: AgentRegistry,
    sessions: SessionStore,
    tokens: Arc<TokenService>,
    manager: Arc<dyn ManagerClient>,
    sol_sessions: DashMap<String, SolSession>,
    vnc_sessions: DashMap<String, VncSession>,
    cancel_tokens: DashMap<String, CancellationToken>,
    session_ttl: Duration,
}

impl ConsoleSessionManager {
    pub fn new(agents: AgentRegistry, sessions: SessionStore, tokens: Arc<TokenService>, manager: Arc<dyn ManagerClient>) -> Self {
        Self { agents, sessions, tokens, manager, sol_sessions: DashMap::new(), vnc_sessions: DashMap::new(), cancel_tokens: DashMap::new(), session_ttl: Duration::seconds(SESSION_COOKIE_TTL_SECS) }
    }

    pub async fn resolve_agent(&self, customer_jwt: &str, server_id: &str) -> Result<(String, String), PlatformError> {
        let (claims, agent_id) = self.resolve_agent_claims(customer_jwt, server_id).await?;
        Ok((claims.customer_id, agent_id))
    }

    async fn resolve_agent_claims(&self, customer_jwt: &str, server_id: &str) -> Result<(CustomerClaims, String), PlatformError> {
        let claims = self.tokens.validate_customer_token(customer_jwt)?;
        let location = self.manager.authorize_server_access(&claims.customer_id, server_id).await?;
        let agent = self
            .agents
            .get_by_datacenter(&location.datacenter_id)
            .into_iter()
            .find(|a| a.status == AgentStatus::Active)
            .ok_or_else(|| PlatformError::BmcError { kind: "agent".into(), message: format!("no active agent in datacenter {}", location.datacenter_id) })?;
        Ok((claims, agent.agent_id))
    }

    pub async fn create_sol_session(&self, customer_jwt: &str, server_id: &str) -> Result<SessionHandle, PlatformError> {
        let (claims, agent_id) = self.resolve_agent_claims(customer_jwt, server_id).await?;
        let session_id = generate_console_session_id();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;
        let token_expires_at = customer_token_exp(&claims)?;
        let sol = SolSession {
            session_id: session_id.clone(),
            server_id: server_id.to_string(),
            agent_id,
            created_at: now,
            expires_at,
            viewer_url: format!("/console/{session_id}"),
            websocket_url: format!("/console/{session_id}/ws"),
        };
        let mut web_session = WebSession::new(customer_jwt.to_string(), claims.customer_id, server_id.to_string(), self.session_ttl, token_expires_at);
        web_session.sol_session_id = Some(session_id.clone());
        self.sessions.create(web_session).await;
        let handle = SessionHandle { session_id: sol.session_id.clone(), viewer_url: sol.viewer_url.clone(), websocket_url: sol.websocket_url.clone(), expires_at };
        self.sol_sessions.insert(session_id, sol);
        Ok(handle)
    }

    pub async fn create_vnc_session(&self, customer_jwt: &str, server_id: &str) -> Result<SessionHandle, PlatformError> {
        let (claims, agent_id) = self.resolve_agent_claims(customer_jwt, server_id).await?;
        let session_id = generate_console_session_id();
        let now = Utc::now();
        let expires_at = now + self.session_ttl;
        let token_expires_at = customer_token_exp(&claims)?;
        let vnc = VncSession {
            session_id: session_id.clone(),
            server_id: server_id.to_string(),
            agent_id,
            created_at: now,
            expires_at,
            viewer_url: format!("/vnc/{session_id}"),
            websocket_url: format!("/vnc/{session_id}/ws"),
        };
        let mut web_session = WebSession::new(customer_jwt.to_string(), claims.customer_id, server_id.to_string(), self.session_ttl, token_expires_at);
        web_session.vnc_session_id = Some(session_id.clone());
        self.sessions.create(web_session).await;
        let handle = SessionHandle { session_id: vnc.session_id.clone(), viewer_url: vnc.viewer_url.clone(), websocket_url: vnc.websocket_url.clone(), expires_at };
        self.vnc_sessions.insert(session_id, vnc);
        Ok(handle)
    }

    pub fn get_sol_session(&self, id: &str) -> Option<SolSession> {
        self.sol_sessions.get(id).map(|s| s.clone())
    }

    pub fn get_vnc_session(&self, id: &str) -> Option<VncSession> {
        self.vnc_sessions.get(id).map(|s| s.clone())
    }

    /// Registers (or replaces) the cancellation token that governs the
    /// currently-live bridge for a session, implementing the at-most-once
    /// policy from spec §5 by cancelling any prior bridge before the new
    /// one starts.
    pub fn claim_bridge(&self, session_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some((_, old)) = self.cancel_tokens.remove(session_id) {
            old.cancel();
        }
        self.cancel_tokens.insert(session_id.to_string(), token.clone());
        token
    }

    pub async fn close_session(&self, session_id: &str) {
        if let Some((_, token)) = self.cancel_tokens.remove(session_id) {
            token.cancel();
        }
        let web_session = if let Some((_, sol)) = self.sol_sessions.remove(session_id) {
            self.sessions.get_by_sol_session_id(&sol.session_id).await.ok()
        } else if let Some((_, vnc)) = self.vnc_sessions.remove(session_id) {
            self.sessions.get_by_vnc_session_id(&vnc.session_id).await.ok()
        } else {
            None
        };
        if let Some(web_session) = web_session {
            self.sessions.delete(&web_session.id).await;
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeManager {
        datacenter: String,
    }

    #[async_trait]
    impl ManagerClient for FakeManager {
        async fn authorize_server_access(&self, _customer_id: &str, _server_id: &str) -> Result<ServerLocation, PlatformError> {
            Ok(ServerLocation { datacenter_id: self.datacenter.clone() })
        }
    }

    fn manager_with(tokens: &TokenService, customer_id: &str, is_admin: bool) -> (ConsoleSessionManager, String) {
        let agents = AgentRegistry::new();
        agents.register("agent-1", "dc1", "ws://agent-1");
        let csm = ConsoleSessionManager::new(agents, SessionStore::new(), Arc::new(tokens.clone()), Arc::new(FakeManager { datacenter: "dc1".into() }));
        let jwt = tokens
            .generate_customer_token(&bmc_proto::CustomerInfo { customer_id: customer_id.to_string(), email: "alice@co".into(), is_admin })
            .unwrap();
        (csm, jwt)
    }

    #[tokio::test]
    async fn create_sol_session_binds_a_web_session_and_returns_urls() {
        let tokens = TokenService::new("test-secret-value").unwrap();
        let (csm, jwt) = manager_with(&tokens, "cust-1", false);
        let handle = csm.create_sol_session(&jwt, "srv-1").await.unwrap();
        assert!(handle.viewer_url.starts_with("/console/"));
        assert!(handle.websocket_url.ends_with("/ws"));
        let bound = csm.sessions().get_by_sol_session_id(&handle.session_id).await.unwrap();
        assert_eq!(bound.server_id, "srv-1");
    }

    #[tokio::test]
    async fn no_active_agent_in_datacenter_is_unavailable() {
        let tokens = TokenService::new("test-secret-value").unwrap();
        let agents = AgentRegistry::new();
        let csm = ConsoleSessionManager::new(agents, SessionStore::new(), Arc::new(tokens.clone()), Arc::new(FakeManager { datacenter: "dc1".into() }));
        let jwt = tokens.generate_customer_token(&bmc_proto::CustomerInfo { customer_id: "c1".into(), email: "a@b".into(), is_admin: false }).unwrap();
        let err = csm.create_sol_session(&jwt, "srv-1").await.unwrap_err();
        assert!(matches!(err, PlatformError::BmcError { .. }));
    }

    #[tokio::test]
    async fn close_session_removes_both_console_and_web_session() {
        let tokens = TokenService::new("test-secret-value").unwrap();
        let (csm, jwt) = manager_with(&tokens, "cust-1", false);
        let handle = csm.create_sol_session(&jwt, "srv-1").await.unwrap();
        csm.close_session(&handle.session_id).await;
        assert!(csm.get_sol_session(&handle.session_id).is_none());
        assert!(csm.sessions().get_by_sol_session_id(&handle.session_id).await.is_err());
    }

    #[tokio::test]
    async fn second_claim_on_live_session_cancels_the_first() {
        let tokens = TokenService::new("test-secret-value").unwrap();
        let (csm, jwt) = manager_with(&tokens, "cust-1", false);
        let handle = csm.create_sol_session(&jwt, "srv-1").await.unwrap();
        let first = csm.claim_bridge(&handle.session_id);
        assert!(!first.is_cancelled());
        let _second = csm.claim_bridge(&handle.session_id);
        assert!(first.is_cancelled());
    }
}
