//! Server Inventory (spec §4.2 SUPPLEMENT): the real schema is out of
//! scope, so this is an in-memory stand-in behind the interface a
//! persisted store would expose. `DashMap`-backed, the same idiom as
//! `gateway::registry::AgentRegistry`.

use bmc_proto::{BmcProtocol, ControlEndpoint, SolEndpoint, VncEndpoint};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct ServerRecord {
    pub server_id: String,
    pub customer_id: String,
    pub datacenter_id: String,
    pub gateway_id: String,
    pub control_endpoints: Vec<ControlEndpoint>,
    pub sol_endpoint: Option<SolEndpoint>,
    pub vnc_endpoint: Option<VncEndpoint>,
    pub primary_protocol: BmcProtocol,
    pub permissions: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ServerInventory {
    servers: Arc<DashMap<String, ServerRecord>>,
}

impl ServerInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ServerRecord) {
        self.servers.insert(record.server_id.clone(), record);
    }

    pub fn get_server(&self, server_id: &str) -> Option<ServerRecord> {
        self.servers.get(server_id).map(|e| e.clone())
    }

    pub fn list_servers(&self) -> Vec<ServerRecord> {
        self.servers.iter().map(|e| e.clone()).collect()
    }

    pub fn servers_for_customer(&self, customer_id: &str) -> Vec<ServerRecord> {
        self.servers.iter().filter(|e| e.customer_id == customer_id).map(|e| e.clone()).collect()
    }

    /// The gateway a browser should be routed to for this server's region.
    /// Out of scope to resolve gateway topology for real (spec.md §1
    /// excludes DB schema and discovery); here it's just the stored field.
    pub fn server_gateway(&self, server_id: &str) -> Option<String> {
        self.servers.get(server_id).map(|e| e.gateway_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(server_id: &str, customer_id: &str) -> ServerRecord {
        ServerRecord {
            server_id: server_id.to_string(),
            customer_id: customer_id.to_string(),
            datacenter_id: "dc1".into(),
            gateway_id: "gw-us-east".into(),
            control_endpoints: vec![],
            sol_endpoint: None,
            vnc_endpoint: None,
            primary_protocol: BmcProtocol::Redfish,
            permissions: vec!["power".into()],
        }
    }

    #[test]
    fn get_and_list_round_trip() {
        let inv = ServerInventory::new();
        inv.insert(sample("srv-1", "cust-1"));
        assert_eq!(inv.get_server("srv-1").unwrap().customer_id, "cust-1");
        assert_eq!(inv.list_servers().len(), 1);
    }

    #[test]
    fn servers_for_customer_filters_by_owner() {
        let inv = ServerInventory::new();
        inv.insert(sample("srv-1", "cust-1"));
        inv.insert(sample("srv-2", "cust-2"));
        let mine = inv.servers_for_customer("cust-1");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].server_id, "srv-1");
    }

    #[test]
    fn server_gateway_resolves_the_stored_field() {
        let inv = ServerInventory::new();
        inv.insert(sample("srv-1", "cust-1"));
        assert_eq!(inv.server_gateway("srv-1").as_deref(), Some("gw-us-east"));
        assert_eq!(inv.server_gateway("missing"), None);
    }
}
