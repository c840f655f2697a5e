//! Local cache of the BMCs this Agent is responsible for, keyed by
//! server_id. Server provisioning and discovery are out of scope
//! (spec.md §1); this is populated once at startup (or via `insert` from
//! whatever out-of-scope provisioning mechanism a deployment uses) and
//! read by the unary dispatcher and the Stream Bridge to find the target
//! BMC for a session. Same `DashMap` idiom as the Gateway's registries.

use bmc_proto::{ControlEndpoint, SolEndpoint, VncEndpoint};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ServerEndpoints {
    pub control_endpoints: Vec<ControlEndpoint>,
    pub sol_endpoint: Option<SolEndpoint>,
    pub vnc_endpoint: Option<VncEndpoint>,
}

impl ServerEndpoints {
    /// First-entry fallback when no explicit primary is set (spec §3).
    pub fn primary_control_endpoint(&self) -> Option<&ControlEndpoint> {
        self.control_endpoints.first()
    }
}

#[derive(Clone, Default)]
pub struct AgentServerMap {
    servers: Arc<DashMap<String, ServerEndpoints>>,
}

impl AgentServerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, server_id: impl Into<String>, endpoints: ServerEndpoints) {
        self.servers.insert(server_id.into(), endpoints);
    }

    pub fn get(&self, server_id: &str) -> Option<ServerEndpoints> {
        self.servers.get(server_id).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_proto::EndpointKind;

    #[test]
    fn primary_control_endpoint_is_the_first_entry() {
        let endpoints = ServerEndpoints {
            control_endpoints: vec![
                ControlEndpoint { kind: EndpointKind::Redfish, uri: "https://a".into(), username: "u".into(), password: "p".into(), tls: None },
                ControlEndpoint { kind: EndpointKind::Ipmi, uri: "10.0.0.1:623".into(), username: "u".into(), password: "p".into(), tls: None },
            ],
            sol_endpoint: None,
            vnc_endpoint: None,
        };
        assert_eq!(endpoints.primary_control_endpoint().unwrap().uri, "https://a");
    }

    #[test]
    fn unknown_server_is_none() {
        let map = AgentServerMap::new();
        assert!(map.get("ghost").is_none());
    }
}
