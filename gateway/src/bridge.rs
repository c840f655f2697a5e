//! Gateway-side Stream Bridge (spec §4.5): bridges an accepted browser
//! WebSocket to the Gateway<->Agent link for one console session.
//!
//! Grounded on the teacher's `handle_stream_relay`
//! (`client/src-tauri/src/relay.rs`): two cooperating tasks, a shared
//! cancellation signal instead of `JoinHandle::abort()` (the agent side
//! of this bridge runs in a different process, so a local abort can't
//! reach it — only a chunk on the wire can), and a best-effort close
//! message on exit.

use crate::agent_link::AgentLinkRegistry;
use axum::extract::ws::{Message, WebSocket};
use bmc_proto::control::RpcEnvelope;
use bmc_proto::{Channel, StreamChunk};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct BridgeParams {
    pub session_id: String,
    pub server_id: String,
    pub agent_id: String,
    pub channel: Channel,
}

/// Runs until the browser closes, the agent closes, an error occurs, or
/// `cancel` fires (session TTL expiry or a replacing bridge, spec §5).
pub async fn run_gateway_bridge(ws: WebSocket, params: BridgeParams, link: AgentLinkRegistry, cancel: CancellationToken) {
    let BridgeParams { session_id, server_id, agent_id, channel } = params;
    let (mut ws_sink, mut ws_stream) = ws.split();
    let (egress_tx, mut egress_rx) = mpsc::unbounded_channel::<StreamChunk>();
    link.register_session_route(&session_id, egress_tx.clone());

    if let Err(e) = link.send_to_agent(&agent_id, RpcEnvelope::OpenStream { session_id: session_id.clone(), server_id: server_id.clone(), channel }) {
        warn!(%session_id, error = %e, "failed to open agent stream");
        link.remove_session_route(&session_id, &egress_tx);
        let _ = ws_sink.close().await;
        return;
    }
    let _ = link.send_to_agent(&agent_id, RpcEnvelope::Chunk(StreamChunk::handshake(session_id.clone(), server_id.clone(), channel)));

    let ingress_done = CancellationToken::new();
    let ingress_cancel = cancel.clone();
    let ingress_done_signal = ingress_done.clone();
    let ingress_session = session_id.clone();
    let ingress_server = server_id.clone();
    let ingress_agent = agent_id.clone();
    let ingress_link = link.clone();
    let ingress = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = ingress_cancel.cancelled() => break,
                frame = ws_stream.next() => {
                    match frame {
                        Some(Ok(Message::Binary(data))) => {
                            let chunk = StreamChunk::data(ingress_session.clone(), ingress_server.clone(), channel, data.into());
                            if ingress_link.send_to_agent(&ingress_agent, RpcEnvelope::Chunk(chunk)).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Text(text))) => {
                            let chunk = StreamChunk::data(ingress_session.clone(), ingress_server.clone(), channel, text.as_bytes().to_vec());
                            if ingress_link.send_to_agent(&ingress_agent, RpcEnvelope::Chunk(chunk)).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => continue, // ping/pong dropped silently
                        Some(Err(_)) => break,
                    }
                }
            }
        }
        ingress_done_signal.cancel();
    });

    let egress_session = session_id.clone();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ingress_done.cancelled() => break,
            chunk = egress_rx.recv() => {
                match chunk {
                    None => break,
                    Some(chunk) if chunk.is_handshake => continue,
                    Some(chunk) if chunk.close_stream => break,
                    Some(chunk) => {
                        if ws_sink.send(Message::Binary(chunk.data.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    ingress.abort();
    link.remove_session_route(&egress_session, &egress_tx);
    let _ = link.send_to_agent(&agent_id, RpcEnvelope::Chunk(StreamChunk::close(session_id.clone(), server_id.clone(), channel)));
    let _ = ws_sink.close().await;
    info!(%session_id, "gateway bridge closed");
}
