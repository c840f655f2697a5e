pub mod agent_link;
pub mod auth;
pub mod bridge;
pub mod console;
pub mod cookie;
pub mod error;
pub mod http;
pub mod manager_client;
pub mod registry;
pub mod session_store;
pub mod state;
