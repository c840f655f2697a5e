//! Agent-side Stream Bridge (spec §4.5/§4.6): bridges the chunk channel
//! multiplexed over the Gateway link to the physical BMC transport for one
//! console session — a TCP socket for native VNC/IPMI-adjacent serial, or
//! a WebSocket for Redfish-serial/VNC-over-WS.
//!
//! Grounded on the teacher's `handle_stream_relay`
//! (`client/src-tauri/src/relay.rs`): two cooperating tasks (BMC->gateway,
//! gateway->BMC), cleanup on either side closing. TCP read timeouts are
//! treated as non-fatal here (spec §4.5) since an idle SOL/VNC session is
//! normal, not a sign the BMC connection died.

use bmc_proto::{Channel, EndpointKind, StreamChunk};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

const TCP_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BridgeTarget {
    pub kind: EndpointKind,
    pub uri: String,
}

pub struct AgentBridgeParams {
    pub session_id: String,
    pub server_id: String,
    pub channel: Channel,
}

/// Runs until the BMC connection closes, the gateway sends a close chunk,
/// or the ingress channel is dropped (gateway-side bridge tore down).
pub async fn run_agent_bridge(
    params: AgentBridgeParams,
    target: BridgeTarget,
    egress_tx: mpsc::UnboundedSender<StreamChunk>,
    ingress_rx: mpsc::UnboundedReceiver<StreamChunk>,
) {
    match target.kind {
        EndpointKind::VncNative | EndpointKind::Ipmi => {
            if let Err(e) = run_tcp_bridge(&params, &target.uri, egress_tx.clone(), ingress_rx).await {
                warn!(session_id = %params.session_id, error = %e, "agent bridge ended with error");
            }
        }
        EndpointKind::VncWebSocket | EndpointKind::RedfishWebSocket | EndpointKind::RedfishSerial => {
            if let Err(e) = run_ws_bridge(&params, &target.uri, egress_tx.clone(), ingress_rx).await {
                warn!(session_id = %params.session_id, error = %e, "agent bridge ended with error");
            }
        }
        EndpointKind::Redfish => {
            warn!(session_id = %params.session_id, "plain Redfish endpoint has no streaming transport");
        }
    }
    let _ = egress_tx.send(StreamChunk::close(params.session_id.clone(), params.server_id.clone(), params.channel));
    info!(session_id = %params.session_id, "agent bridge closed");
}

async fn run_tcp_bridge(
    params: &AgentBridgeParams,
    uri: &str,
    egress_tx: mpsc::UnboundedSender<StreamChunk>,
    mut ingress_rx: mpsc::UnboundedReceiver<StreamChunk>,
) -> std::io::Result<()> {
    let stream = TcpStream::connect(uri).await?;
    let (mut read_half, mut write_half) = stream.into_split();

    let read_session = params.session_id.clone();
    let read_server = params.server_id.clone();
    let channel = params.channel;
    let bmc_to_gateway = tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];
        loop {
            match tokio::time::timeout(TCP_READ_TIMEOUT, read_half.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    let chunk = StreamChunk::data(read_session.clone(), read_server.clone(), channel, buf[..n].to_vec());
                    if egress_tx.send(chunk).is_err() {
                        break;
                    }
                }
                Ok(Err(_)) => break,
                Err(_) => continue, // idle read timeout, not a connection failure
            }
        }
    });

    let gateway_to_bmc = tokio::spawn(async move {
        while let Some(chunk) = ingress_rx.recv().await {
            if chunk.is_handshake {
                continue;
            }
            if chunk.close_stream {
                break;
            }
            if write_half.write_all(&chunk.data).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = bmc_to_gateway => {},
        _ = gateway_to_bmc => {},
    }
    Ok(())
}

async fn run_ws_bridge(
    params: &AgentBridgeParams,
    uri: &str,
    egress_tx: mpsc::UnboundedSender<StreamChunk>,
    mut ingress_rx: mpsc::UnboundedReceiver<StreamChunk>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (ws, _) = tokio_tungstenite::connect_async(uri).await?;
    let (mut ws_sink, mut ws_stream) = ws.split();

    let read_session = params.session_id.clone();
    let read_server = params.server_id.clone();
    let channel = params.channel;
    let bmc_to_gateway = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_stream.next().await {
            match msg {
                Message::Binary(data) => {
                    let chunk = StreamChunk::data(read_session.clone(), read_server.clone(), channel, data.into());
                    if egress_tx.send(chunk).is_err() {
                        break;
                    }
                }
                Message::Text(text) => {
                    let chunk = StreamChunk::data(read_session.clone(), read_server.clone(), channel, text.as_bytes().to_vec());
                    if egress_tx.send(chunk).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => continue,
            }
        }
    });

    let gateway_to_bmc = tokio::spawn(async move {
        while let Some(chunk) = ingress_rx.recv().await {
            if chunk.is_handshake {
                continue;
            }
            if chunk.close_stream {
                break;
            }
            if ws_sink.send(Message::Binary(chunk.data.into())).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = bmc_to_gateway => {},
        _ = gateway_to_bmc => {},
    }
    Ok(())
}
