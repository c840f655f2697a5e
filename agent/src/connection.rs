//! Persistent outbound link to the Gateway (spec §2, §4.6): the Agent
//! dials the Gateway's `/agent/ws`, registers, heartbeats, and dispatches
//! inbound control/data frames until the socket drops, then reconnects.
//!
//! Grounded directly on the teacher's `run_agent_loop`
//! (`client/src-tauri/src/agent.rs`): connect, send a registration message,
//! spawn an outbound-sender task and a heartbeat task, loop reading inbound
//! messages, and on any of those ending, tear down and retry. The teacher
//! retries after a fixed 3-second sleep; this generalizes that into capped
//! exponential backoff since a Gateway outage here can last much longer
//! than the teacher's relay-server restarts.

use crate::bmc::BmcDriver;
use crate::bridge::{self, AgentBridgeParams, BridgeTarget};
use crate::server_map::AgentServerMap;
use bmc_proto::control::{encode, decode, RpcEnvelope, UnaryOp, UnaryResult};
use bmc_proto::chunk::StreamChunk;
use dashmap::DashMap;
use futures::{Stream, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub datacenter_id: String,
    pub gateway_ws_url: String,
    pub public_endpoint: String,
}

/// Runs forever: connect, serve, reconnect with backoff on disconnect.
pub async fn run_agent_loop(config: AgentConfig, servers: AgentServerMap) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        info!(gateway = %config.gateway_ws_url, "connecting to gateway");
        match run_connection(&config, &servers).await {
            Ok(()) => info!("gateway connection closed cleanly"),
            Err(e) => warn!(error = %e, "gateway connection failed"),
        }
        tokio::time::sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
    }
}

async fn run_connection(config: &AgentConfig, servers: &AgentServerMap) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (ws, _) = tokio_tungstenite::connect_async(&config.gateway_ws_url).await?;
    let (mut ws_sink, mut ws_stream) = ws.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<RpcEnvelope>();
    let register = RpcEnvelope::Register {
        agent_id: config.agent_id.clone(),
        datacenter_id: config.datacenter_id.clone(),
        endpoint: config.public_endpoint.clone(),
    };
    let _ = outbound_tx.send(register);

    let outbound_task = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            match encode(&envelope) {
                Ok(bytes) => {
                    if ws_sink.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!(error = %e, "failed to encode outbound envelope"),
            }
        }
    });

    let heartbeat_agent_id = config.agent_id.clone();
    let heartbeat_tx = outbound_tx.clone();
    let heartbeat_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            ticker.tick().await;
            let msg = RpcEnvelope::Heartbeat { agent_id: heartbeat_agent_id.clone(), at: chrono::Utc::now() };
            if heartbeat_tx.send(msg).is_err() {
                break;
            }
        }
    });

    // Per-session routing for inbound Chunk frames while a bridge is open.
    let session_routes: Arc<DashMap<String, mpsc::UnboundedSender<StreamChunk>>> = Arc::new(DashMap::new());

    let result = dispatch_inbound(&mut ws_stream, servers, &session_routes, &outbound_tx).await;

    outbound_task.abort();
    heartbeat_task.abort();
    session_routes.clear();
    result
}

async fn dispatch_inbound(
    ws_stream: &mut (impl Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
    servers: &AgentServerMap,
    session_routes: &Arc<DashMap<String, mpsc::UnboundedSender<StreamChunk>>>,
    outbound_tx: &mpsc::UnboundedSender<RpcEnvelope>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    while let Some(msg) = ws_stream.next().await {
        let msg = msg?;
        let bytes = match msg {
            Message::Binary(b) => b,
            Message::Close(_) => break,
            _ => continue,
        };
        let envelope = match decode(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to decode inbound envelope, dropping frame");
                continue;
            }
        };
        match envelope {
            RpcEnvelope::OpenStream { session_id, server_id, channel } => {
                handle_open_stream(session_id, server_id, channel, servers, session_routes, outbound_tx);
            }
            RpcEnvelope::Chunk(chunk) => {
                if let Some(route) = session_routes.get(&chunk.session_id) {
                    let _ = route.send(chunk);
                }
            }
            RpcEnvelope::UnaryRequest { request_id, server_id, op } => {
                handle_unary_request(request_id, server_id, op, servers, outbound_tx);
            }
            RpcEnvelope::Register { .. } | RpcEnvelope::Heartbeat { .. } => {
                // Agent -> Gateway only; the Gateway never sends these back.
            }
            RpcEnvelope::UnaryResponse { .. } => {}
            RpcEnvelope::Error { message } => warn!(%message, "gateway reported an error"),
        }
    }
    Ok(())
}

fn handle_open_stream(
    session_id: String,
    server_id: String,
    channel: bmc_proto::Channel,
    servers: &AgentServerMap,
    session_routes: &Arc<DashMap<String, mpsc::UnboundedSender<StreamChunk>>>,
    outbound_tx: &mpsc::UnboundedSender<RpcEnvelope>,
) {
    let Some(endpoints) = servers.get(&server_id) else {
        warn!(%server_id, "open-stream requested for unknown server");
        let _ = outbound_tx.send(RpcEnvelope::Chunk(StreamChunk::close(session_id, server_id, channel)));
        return;
    };
    let target = match channel {
        bmc_proto::Channel::Sol => endpoints.sol_endpoint.as_ref().map(|e| BridgeTarget { kind: e.kind, uri: e.uri.clone() }),
        bmc_proto::Channel::Vnc => endpoints.vnc_endpoint.as_ref().map(|e| BridgeTarget { kind: e.kind, uri: e.uri.clone() }),
    };
    let Some(target) = target else {
        warn!(%server_id, ?channel, "no endpoint configured for requested channel");
        let _ = outbound_tx.send(RpcEnvelope::Chunk(StreamChunk::close(session_id, server_id, channel)));
        return;
    };

    let (ingress_tx, ingress_rx) = mpsc::unbounded_channel::<StreamChunk>();
    session_routes.insert(session_id.clone(), ingress_tx);

    let egress_tx = outbound_tx.clone();
    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel::<StreamChunk>();
    let routes = session_routes.clone();
    let bridge_session_id = session_id.clone();
    tokio::spawn(async move {
        let params = AgentBridgeParams { session_id: session_id.clone(), server_id: server_id.clone(), channel };
        bridge::run_agent_bridge(params, target, relay_tx, ingress_rx).await;
        routes.remove(&bridge_session_id);
    });
    tokio::spawn(async move {
        while let Some(chunk) = relay_rx.recv().await {
            if egress_tx.send(RpcEnvelope::Chunk(chunk)).is_err() {
                break;
            }
        }
    });
}

fn handle_unary_request(request_id: String, server_id: String, op: UnaryOp, servers: &AgentServerMap, outbound_tx: &mpsc::UnboundedSender<RpcEnvelope>) {
    let Some(endpoints) = servers.get(&server_id) else {
        let _ = outbound_tx.send(RpcEnvelope::UnaryResponse { request_id, result: UnaryResult::Error(format!("unknown server {server_id}")) });
        return;
    };
    let Some(control) = endpoints.primary_control_endpoint().cloned() else {
        let _ = outbound_tx.send(RpcEnvelope::UnaryResponse { request_id, result: UnaryResult::Error("no control endpoint configured".into()) });
        return;
    };
    let outbound_tx = outbound_tx.clone();
    tokio::spawn(async move {
        let driver = BmcDriver::for_endpoint(&control);
        let result = match op {
            UnaryOp::Power(power_op) => match driver.power(power_op).await {
                Ok(state) => UnaryResult::Power(state),
                Err(e) => UnaryResult::Error(e.to_string()),
            },
            UnaryOp::Sensors => match driver.sensors().await {
                Ok(readings) => UnaryResult::Sensors(readings),
                Err(e) => UnaryResult::Error(e.to_string()),
            },
            UnaryOp::Info => match driver.info().await {
                Ok(info) => UnaryResult::Info(info),
                Err(e) => UnaryResult::Error(e.to_string()),
            },
        };
        let _ = outbound_tx.send(RpcEnvelope::UnaryResponse { request_id, result });
    });
}
