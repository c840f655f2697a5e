//! Messages carried on the persistent Gateway<->Agent link.
//!
//! The Agent dials this link outbound and keeps it open for its whole
//! lifetime (spec §2: "Local Agents... hold outbound connections to their
//! Gateway"). `RpcEnvelope` multiplexes the control-plane (register,
//! heartbeat, open/close) and the data-plane (`StreamChunk`) over that one
//! connection, since both directions need the same framing and ordering
//! guarantees.

use crate::chunk::{Channel, StreamChunk};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Active,
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub datacenter_id: String,
    pub endpoint: String,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub status: AgentStatus,
}

/// One frame on the Gateway<->Agent link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcEnvelope {
    /// Agent -> Gateway, sent once on connect.
    Register { agent_id: String, datacenter_id: String, endpoint: String },
    /// Agent -> Gateway, sent periodically.
    Heartbeat { agent_id: String, at: chrono::DateTime<chrono::Utc> },
    /// Gateway -> Agent, opens a session-bound stream on `channel`.
    OpenStream { session_id: String, server_id: String, channel: Channel },
    /// Either direction, a session's bridge data or handshake/close chunk.
    Chunk(StreamChunk),
    /// Gateway -> Agent, asks the Agent to run a unary BMC operation.
    UnaryRequest { request_id: String, server_id: String, op: UnaryOp },
    /// Agent -> Gateway, the result of a `UnaryRequest`.
    UnaryResponse { request_id: String, result: UnaryResult },
    /// Either direction, a fatal protocol or transport error.
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PowerOp {
    On,
    Off,
    Cycle,
    Reset,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnaryOp {
    Power(PowerOp),
    Sensors,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnaryResult {
    Power(PowerState),
    Sensors(Vec<SensorReading>),
    Info(BmcInfo),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmcInfo {
    pub vendor: String,
    pub model: String,
    pub firmware_version: String,
}

/// Encodes an `RpcEnvelope` as a length-prefixed bincode frame, matching
/// the binary WebSocket framing the Stream Bridge needs for raw BMC bytes
/// (JSON text frames, as the teacher uses for its controller link, would
/// force base64 inflation on every console byte).
pub fn encode(msg: &RpcEnvelope) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(msg)
}

pub fn decode(bytes: &[u8]) -> Result<RpcEnvelope, bincode::Error> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips() {
        let msg = RpcEnvelope::Chunk(StreamChunk::data("s", "srv", Channel::Sol, vec![1, 2, 3]));
        let bytes = encode(&msg).unwrap();
        let back = decode(&bytes).unwrap();
        match back {
            RpcEnvelope::Chunk(c) => assert_eq!(c.data, vec![1, 2, 3]),
            _ => panic!("wrong variant"),
        }
    }
}
