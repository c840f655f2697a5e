//! Exercises the Agent-side Stream Bridge against a real TCP listener
//! standing in for a native VNC BMC: bytes written on the ingress channel
//! reach the "BMC" socket, and bytes the "BMC" writes back come out on the
//! egress channel, in order.

use bmc_agent::bridge::{run_agent_bridge, AgentBridgeParams, BridgeTarget};
use bmc_proto::{Channel, EndpointKind, StreamChunk};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[tokio::test]
async fn tcp_bridge_relays_bytes_in_both_directions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let fake_bmc = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let n = socket.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello from browser");
        socket.write_all(b"hello from bmc").await.unwrap();
    });

    let (egress_tx, mut egress_rx) = mpsc::unbounded_channel::<StreamChunk>();
    let (ingress_tx, ingress_rx) = mpsc::unbounded_channel::<StreamChunk>();

    let params = AgentBridgeParams { session_id: "sess-1".into(), server_id: "srv-1".into(), channel: Channel::Vnc };
    let target = BridgeTarget { kind: EndpointKind::VncNative, uri: addr.to_string() };

    let bridge = tokio::spawn(run_agent_bridge(params, target, egress_tx, ingress_rx));

    ingress_tx.send(StreamChunk::data("sess-1", "srv-1", Channel::Vnc, b"hello from browser".to_vec())).unwrap();

    fake_bmc.await.unwrap();

    let mut received = Vec::new();
    let close = loop {
        let chunk = egress_rx.recv().await.unwrap();
        if chunk.close_stream {
            break chunk;
        }
        received.extend_from_slice(&chunk.data);
    };
    assert_eq!(received, b"hello from bmc".to_vec());
    assert_eq!(close.session_id, "sess-1");

    drop(ingress_tx);
    bridge.await.unwrap();
}
