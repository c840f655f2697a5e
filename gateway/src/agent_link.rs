//! Routes frames between the Gateway's HTTP surface and whichever Agent
//! WebSocket connection currently represents a given agent-id, and
//! demultiplexes chunks/unary responses arriving from an agent back to the
//! session or request that's waiting on them.
//!
//! This is the "RPC bidi stream to the agent" spec §4.5 refers to: one
//! long-lived WebSocket per agent (the Agent dials in, spec §2), carrying
//! many sessions' chunks interleaved, tagged by `session_id`.

use bmc_proto::control::{RpcEnvelope, UnaryOp, UnaryResult};
use bmc_proto::{PlatformError, StreamChunk};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[derive(Clone)]
struct AgentConnection {
    tx: mpsc::UnboundedSender<RpcEnvelope>,
}

#[derive(Clone, Default)]
pub struct AgentLinkRegistry {
    connections: Arc<DashMap<String, AgentConnection>>,
    session_routes: Arc<DashMap<String, mpsc::UnboundedSender<StreamChunk>>>,
    pending_unary: Arc<DashMap<String, oneshot::Sender<UnaryResult>>>,
}

impl AgentLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_connection(&self, agent_id: &str, tx: mpsc::UnboundedSender<RpcEnvelope>) {
        self.connections.insert(agent_id.to_string(), AgentConnection { tx });
    }

    /// Connection drop never removes the Agent Registry entry (spec §4.2:
    /// "explicit removal only"); it only stops routing until the agent
    /// reconnects and re-registers.
    pub fn remove_connection(&self, agent_id: &str) {
        self.connections.remove(agent_id);
    }

    pub fn is_connected(&self, agent_id: &str) -> bool {
        self.connections.contains_key(agent_id)
    }

    pub fn send_to_agent(&self, agent_id: &str, envelope: RpcEnvelope) -> Result<(), PlatformError> {
        let conn = self.connections.get(agent_id).ok_or_else(|| PlatformError::BmcError { kind: "agent".into(), message: "agent not connected".into() })?;
        conn.tx.send(envelope).map_err(|_| PlatformError::TransportError("agent link closed".into()))
    }

    pub fn register_session_route(&self, session_id: &str, tx: mpsc::UnboundedSender<StreamChunk>) {
        self.session_routes.insert(session_id.to_string(), tx);
    }

    /// Removes the route only if it still belongs to `tx` (compare-and-remove
    /// on channel identity), so a bridge that was already replaced can't
    /// delete the route its replacement just registered under the same
    /// `session_id` (spec §5, §9: "replace, not reject" must not regress
    /// delivery to the new viewer).
    pub fn remove_session_route(&self, session_id: &str, tx: &mpsc::UnboundedSender<StreamChunk>) {
        self.session_routes.remove_if(session_id, |_, current| current.same_channel(tx));
    }

    /// Called by each agent connection's inbound loop for every frame it
    /// reads, routing chunks to the waiting Stream Bridge task and unary
    /// results to the waiting RPC caller.
    pub fn dispatch_incoming(&self, envelope: RpcEnvelope) {
        match envelope {
            RpcEnvelope::Chunk(chunk) => {
                if let Some(route) = self.session_routes.get(&chunk.session_id) {
                    let _ = route.send(chunk);
                }
            }
            RpcEnvelope::UnaryResponse { request_id, result } => {
                if let Some((_, sender)) = self.pending_unary.remove(&request_id) {
                    let _ = sender.send(result);
                }
            }
            _ => {}
        }
    }

    pub async fn send_unary_request(&self, agent_id: &str, server_id: &str, op: UnaryOp) -> Result<UnaryResult, PlatformError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending_unary.insert(request_id.clone(), tx);
        if let Err(e) = self.send_to_agent(agent_id, RpcEnvelope::UnaryRequest { request_id: request_id.clone(), server_id: server_id.to_string(), op }) {
            self.pending_unary.remove(&request_id);
            return Err(e);
        }
        match tokio::time::timeout(Duration::from_secs(15), rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(PlatformError::TransportError("agent link closed before responding".into())),
            Err(_) => {
                self.pending_unary.remove(&request_id);
                Err(PlatformError::BmcError { kind: "timeout".into(), message: "agent did not respond in time".into() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_proto::Channel;

    #[tokio::test]
    async fn chunk_routes_to_the_registered_session() {
        let reg = AgentLinkRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        reg.register_session_route("s1", tx);
        reg.dispatch_incoming(RpcEnvelope::Chunk(StreamChunk::data("s1", "srv", Channel::Sol, vec![9])));
        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.data, vec![9]);
    }

    #[tokio::test]
    async fn remove_session_route_is_a_no_op_once_the_route_was_replaced() {
        let reg = AgentLinkRegistry::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel::<StreamChunk>();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel::<StreamChunk>();
        reg.register_session_route("s1", old_tx.clone());
        reg.register_session_route("s1", new_tx);
        reg.remove_session_route("s1", &old_tx);
        reg.dispatch_incoming(RpcEnvelope::Chunk(StreamChunk::data("s1", "srv", Channel::Sol, vec![7])));
        let chunk = new_rx.recv().await.unwrap();
        assert_eq!(chunk.data, vec![7]);
    }

    #[tokio::test]
    async fn send_to_agent_fails_when_not_connected() {
        let reg = AgentLinkRegistry::new();
        let err = reg.send_to_agent("ghost", RpcEnvelope::Heartbeat { agent_id: "ghost".into(), at: chrono::Utc::now() });
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn unary_response_completes_the_waiting_caller() {
        let reg = AgentLinkRegistry::new();
        let (tx, mut agent_rx) = mpsc::unbounded_channel();
        reg.register_connection("a1", tx);
        let reg2 = reg.clone();
        let call = tokio::spawn(async move { reg2.send_unary_request("a1", "srv1", UnaryOp::Info).await });
        let RpcEnvelope::UnaryRequest { request_id, .. } = agent_rx.recv().await.unwrap() else { panic!("expected unary request") };
        reg.dispatch_incoming(RpcEnvelope::UnaryResponse {
            request_id,
            result: UnaryResult::Info(bmc_proto::BmcInfo { vendor: "v".into(), model: "m".into(), firmware_version: "1".into() }),
        });
        let result = call.await.unwrap().unwrap();
        assert!(matches!(result, UnaryResult::Info(_)));
    }
}
