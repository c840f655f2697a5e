//! Agent Registry (spec §4.2): in-memory map of agent-id -> {datacenter,
//! endpoint, last-seen, status}, rebuilt on restart from registrations and
//! heartbeats. Modeled on the teacher's `state::AppState.agents`
//! (`DashMap<String, AgentInfo>`), generalized to carry the richer
//! `AgentInfo` record this spec requires and a janitor that marks-not-
//! deletes stale entries.

use bmc_proto::{AgentInfo, AgentStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<DashMap<String, AgentInfo>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: inserts or updates, always resetting status to Active
    /// (spec §4.2 invariant).
    pub fn register(&self, agent_id: impl Into<String>, datacenter_id: impl Into<String>, endpoint: impl Into<String>) {
        let agent_id = agent_id.into();
        self.agents.insert(
            agent_id.clone(),
            AgentInfo { agent_id, datacenter_id: datacenter_id.into(), endpoint: endpoint.into(), last_seen: Utc::now(), status: AgentStatus::Active },
        );
    }

    pub fn update_last_seen(&self, agent_id: &str, at: DateTime<Utc>) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.last_seen = at;
            entry.status = AgentStatus::Active;
        }
    }

    /// Reads return copies so callers never observe a torn record or share
    /// mutable state with the registry (spec §4.2).
    pub fn get(&self, agent_id: &str) -> Option<AgentInfo> {
        self.agents.get(agent_id).map(|e| e.clone())
    }

    pub fn list(&self) -> Vec<AgentInfo> {
        self.agents.iter().map(|e| e.clone()).collect()
    }

    pub fn get_by_datacenter(&self, datacenter_id: &str) -> Vec<AgentInfo> {
        self.agents.iter().filter(|e| e.datacenter_id == datacenter_id).map(|e| e.clone()).collect()
    }

    pub fn remove(&self, agent_id: &str) {
        self.agents.remove(agent_id);
    }

    pub fn count(&self) -> usize {
        self.agents.len()
    }

    /// Marks (never deletes) entries whose last heartbeat is older than
    /// `threshold` relative to `now` as stale (spec §4.2).
    pub fn cleanup(&self, threshold: chrono::Duration, now: DateTime<Utc>) {
        for mut entry in self.agents.iter_mut() {
            if now - entry.last_seen > threshold {
                entry.status = AgentStatus::Stale;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_and_resets_to_active() {
        let reg = AgentRegistry::new();
        reg.register("a1", "dc1", "ws://a1");
        reg.cleanup(chrono::Duration::seconds(-1), Utc::now());
        assert_eq!(reg.get("a1").unwrap().status, AgentStatus::Stale);
        reg.register("a1", "dc1", "ws://a1");
        assert_eq!(reg.get("a1").unwrap().status, AgentStatus::Active);
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn cleanup_marks_without_deleting() {
        let reg = AgentRegistry::new();
        reg.register("a1", "dc1", "ws://a1");
        reg.cleanup(chrono::Duration::seconds(-1), Utc::now());
        assert!(reg.get("a1").is_some());
        assert_eq!(reg.get("a1").unwrap().status, AgentStatus::Stale);
    }

    #[test]
    fn list_and_get_by_datacenter_return_copies() {
        let reg = AgentRegistry::new();
        reg.register("a1", "dc1", "ws://a1");
        reg.register("a2", "dc2", "ws://a2");
        assert_eq!(reg.list().len(), 2);
        assert_eq!(reg.get_by_datacenter("dc1").len(), 1);
        assert_eq!(reg.get_by_datacenter("dc1")[0].agent_id, "a1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_register_and_list_is_safe() {
        let reg = AgentRegistry::new();
        let mut handles = Vec::new();
        for i in 0..200 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                reg.register(format!("agent-{i}"), "dc1", format!("ws://{i}"));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(reg.count(), 200);
        assert_eq!(reg.list().len(), 200);
    }
}
