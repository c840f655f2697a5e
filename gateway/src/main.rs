//! Gateway entry point: wires the shared state, builds the HTTP/WebSocket
//! router, and spawns the background janitors (spec §4.3, §7), mirroring
//! the teacher's `main.rs` shape (init tracing, build state, build router,
//! bind, serve) plus the extra long-running tasks this service needs.

use bmc_gateway::agent_link::AgentLinkRegistry;
use bmc_gateway::console::ConsoleSessionManager;
use bmc_gateway::manager_client::HttpManagerClient;
use bmc_gateway::registry::AgentRegistry;
use bmc_gateway::session_store::SessionStore;
use bmc_gateway::state::AppState;
use bmc_gateway::http;
use bmc_proto::TokenService;
use chrono::Duration as ChronoDuration;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

struct Config {
    bind_addr: SocketAddr,
    region: String,
    shared_secret: String,
    manager_url: String,
    agent_stale_after: ChronoDuration,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8443".to_string()).parse()?;
        let region = std::env::var("GATEWAY_REGION").unwrap_or_else(|_| "default".to_string());
        let shared_secret = std::env::var("GATEWAY_SHARED_SECRET")
            .map_err(|_| anyhow::anyhow!("GATEWAY_SHARED_SECRET must be set"))?;
        let manager_url = std::env::var("GATEWAY_MANAGER_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
        let agent_stale_after = ChronoDuration::seconds(
            std::env::var("GATEWAY_AGENT_STALE_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(90),
        );
        Ok(Self { bind_addr, region, shared_secret, manager_url, agent_stale_after })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bmc_gateway=info".into()))
        .init();

    let config = Config::from_env()?;

    let agents = AgentRegistry::new();
    let sessions = SessionStore::new();
    let link = AgentLinkRegistry::new();
    let tokens = Arc::new(TokenService::new(config.shared_secret.clone())?);
    let manager = Arc::new(HttpManagerClient::new(config.manager_url.clone()));
    let console = Arc::new(ConsoleSessionManager::new(agents.clone(), sessions.clone(), tokens.clone(), manager));

    let state = AppState { agents: agents.clone(), sessions: sessions.clone(), console, link, tokens, region: Arc::from(config.region.as_str()) };

    spawn_session_janitor(sessions.clone());
    spawn_agent_janitor(agents, config.agent_stale_after);
    spawn_token_renewal_worker(sessions, config.manager_url);

    let app = http::router(state);
    info!(addr = %config.bind_addr, "bmc-gateway listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Sweeps expired `WebSession`s every 5 minutes (spec §4.3).
fn spawn_session_janitor(sessions: SessionStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let removed = sessions.delete_expired().await;
            if removed > 0 {
                info!(removed, "session janitor swept expired sessions");
            }
        }
    });
}

/// Marks agents stale after a heartbeat gap; never deletes (spec §4.2).
fn spawn_agent_janitor(agents: AgentRegistry, stale_after: ChronoDuration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            agents.cleanup(stale_after, chrono::Utc::now());
        }
    });
}

/// Polls for sessions past 80% of their token lifetime and asks the Manager
/// to mint a fresh server token; on failure the session is left alone and
/// expires naturally (spec §7 — no retry).
fn spawn_token_renewal_worker(sessions: SessionStore, manager_url: String) {
    tokio::spawn(async move {
        let http = reqwest::Client::new();
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            for session in sessions.get_sessions_needing_renewal().await {
                let url = format!("{manager_url}/api/servers/{}/token", session.server_id);
                match http.post(&url).json(&serde_json::json!({ "customer_id": session.customer_id })).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        info!(session_id = %session.id, "renewed server token");
                    }
                    Ok(resp) => warn!(session_id = %session.id, status = %resp.status(), "token renewal rejected"),
                    Err(e) => warn!(session_id = %session.id, error = %e, "token renewal request failed"),
                }
            }
        }
    });
}
