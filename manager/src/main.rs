//! Manager entry point. Same shape as the Gateway's `main.rs` and the
//! teacher's: init tracing, build state, build router, bind, serve. Server
//! inventory seeding/persistence is out of scope (spec.md §1); it starts
//! empty here and is populated through whatever out-of-scope provisioning
//! path a real deployment uses.

use bmc_manager::inventory::ServerInventory;
use bmc_manager::state::ManagerState;
use bmc_manager::http;
use bmc_proto::TokenService;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

struct Config {
    bind_addr: SocketAddr,
    shared_secret: String,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        let bind_addr = std::env::var("MANAGER_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()).parse()?;
        let shared_secret = std::env::var("MANAGER_SHARED_SECRET").map_err(|_| anyhow::anyhow!("MANAGER_SHARED_SECRET must be set"))?;
        Ok(Self { bind_addr, shared_secret })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "bmc_manager=info".into()))
        .init();

    let config = Config::from_env()?;
    let state = ManagerState { inventory: ServerInventory::new(), tokens: Arc::new(TokenService::new(config.shared_secret)?) };

    let app = http::router(state);
    info!(addr = %config.bind_addr, "bmc-manager listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
