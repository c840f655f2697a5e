//! Agent entry point: a long-running client with no inbound HTTP surface
//! of its own (spec §2) — it dials the Gateway's `/agent/ws` and stays
//! connected. Mirrors the teacher's Tauri app setup, which spawns
//! `run_agent_loop` as a background task and lets the rest of the process
//! run independently of it.

use bmc_agent::connection::{run_agent_loop, AgentConfig};
use bmc_agent::server_map::AgentServerMap;

struct Config {
    agent: AgentConfig,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let agent_id = std::env::var("AGENT_ID").map_err(|_| anyhow::anyhow!("AGENT_ID must be set"))?;
        let datacenter_id = std::env::var("AGENT_DATACENTER_ID").map_err(|_| anyhow::anyhow!("AGENT_DATACENTER_ID must be set"))?;
        let gateway_ws_url = std::env::var("AGENT_GATEWAY_URL").unwrap_or_else(|_| "ws://127.0.0.1:8443/agent/ws".to_string());
        let public_endpoint = std::env::var("AGENT_PUBLIC_ENDPOINT").unwrap_or_else(|_| agent_id.clone());
        Ok(Self { agent: AgentConfig { agent_id, datacenter_id, gateway_ws_url, public_endpoint } })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bmc_agent=info".into()))
        .init();

    let config = Config::from_env()?;

    // Server provisioning/discovery is out of scope (spec.md §1); a real
    // deployment would populate this from whatever inventory mechanism it
    // uses before (or while) the connection loop runs.
    let servers = AgentServerMap::new();

    tracing::info!(agent_id = %config.agent.agent_id, gateway = %config.agent.gateway_ws_url, "bmc-agent starting");
    tokio::spawn(run_agent_loop(config.agent, servers));

    tokio::signal::ctrl_c().await?;
    tracing::info!("bmc-agent shutting down");
    Ok(())
}
