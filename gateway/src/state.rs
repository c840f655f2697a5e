//! Shared application state, cloned into each axum handler — mirrors the
//! teacher's `state::AppState`, generalized from three `DashMap`s to the
//! full set of registries/stores this spec names.

use crate::agent_link::AgentLinkRegistry;
use crate::console::ConsoleSessionManager;
use crate::registry::AgentRegistry;
use crate::session_store::SessionStore;
use bmc_proto::TokenService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub agents: AgentRegistry,
    pub sessions: SessionStore,
    pub console: Arc<ConsoleSessionManager>,
    pub link: AgentLinkRegistry,
    pub tokens: Arc<TokenService>,
    pub region: Arc<str>,
}
