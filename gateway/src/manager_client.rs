//! Production `ManagerClient`: a `reqwest` HTTP client calling the Manager's
//! authorize endpoint. The wider RPC surface (spec.md §6) is specified as
//! JSON-over-WebSocket, but this one call is a plain request/response with
//! no need for a held-open connection, so it is done the way the pack's
//! other `reqwest`-based clients do single-shot calls (e.g. `mcp-bouncer-core`).

use crate::console::{ManagerClient, ServerLocation};
use async_trait::async_trait;
use bmc_proto::PlatformError;
use serde::Deserialize;

pub struct HttpManagerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpManagerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: reqwest::Client::new() }
    }
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    datacenter_id: String,
}

#[async_trait]
impl ManagerClient for HttpManagerClient {
    async fn authorize_server_access(&self, customer_id: &str, server_id: &str) -> Result<ServerLocation, PlatformError> {
        let url = format!("{}/api/authorize", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "customer_id": customer_id, "server_id": server_id }))
            .send()
            .await
            .map_err(|e| PlatformError::TransportError(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(server_id.to_string()));
        }
        if resp.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(PlatformError::AuthForbidden(format!("customer {customer_id} may not access {server_id}")));
        }
        if !resp.status().is_success() {
            return Err(PlatformError::TransportError(format!("manager returned {}", resp.status())));
        }
        let body: AuthorizeResponse = resp.json().await.map_err(|e| PlatformError::TransportError(e.to_string()))?;
        Ok(ServerLocation { datacenter_id: body.datacenter_id })
    }
}
