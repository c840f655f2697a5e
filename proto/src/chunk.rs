//! Wire record carried over the Gateway<->Agent link (spec: `StreamChunk`).
//!
//! `ConsoleDataChunk` and `VNCDataChunk` in the spec's RPC surface are the
//! same shape; `Channel` is the tag that used to be two separate RPC
//! methods.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    Sol,
    Vnc,
}

/// A single chunk on the Gateway<->Agent bridge.
///
/// `is_handshake` chunks carry no payload. `close_stream` chunks are the
/// last chunk on their direction; no data chunks follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub session_id: String,
    pub server_id: String,
    pub channel: Channel,
    #[serde(with = "serde_bytes_vec")]
    pub data: Vec<u8>,
    pub is_handshake: bool,
    pub close_stream: bool,
}

impl StreamChunk {
    pub fn handshake(session_id: impl Into<String>, server_id: impl Into<String>, channel: Channel) -> Self {
        Self {
            session_id: session_id.into(),
            server_id: server_id.into(),
            channel,
            data: Vec::new(),
            is_handshake: true,
            close_stream: false,
        }
    }

    pub fn close(session_id: impl Into<String>, server_id: impl Into<String>, channel: Channel) -> Self {
        Self {
            session_id: session_id.into(),
            server_id: server_id.into(),
            channel,
            data: Vec::new(),
            is_handshake: false,
            close_stream: true,
        }
    }

    pub fn data(session_id: impl Into<String>, server_id: impl Into<String>, channel: Channel, data: Vec<u8>) -> Self {
        Self {
            session_id: session_id.into(),
            server_id: server_id.into(),
            channel,
            data,
            is_handshake: false,
            close_stream: false,
        }
    }
}

/// bincode serializes `Vec<u8>` element-by-element by default; this module
/// keeps the wire format compact by treating it as a byte blob.
mod serde_bytes_vec {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        struct Visitor;
        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = Vec<u8>;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a byte array")
            }
            fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(v)
            }
            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(v.to_vec())
            }
            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element()? {
                    out.push(b);
                }
                Ok(out)
            }
        }
        d.deserialize_bytes(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_carries_no_payload() {
        let c = StreamChunk::handshake("s1", "srv1", Channel::Sol);
        assert!(c.is_handshake);
        assert!(c.data.is_empty());
        assert!(!c.close_stream);
    }

    #[test]
    fn bincode_roundtrip_preserves_bytes() {
        let c = StreamChunk::data("s1", "srv1", Channel::Vnc, vec![0x1b, 0x5b, 0x41]);
        let encoded = bincode::serialize(&c).unwrap();
        let decoded: StreamChunk = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded.data, vec![0x1b, 0x5b, 0x41]);
        assert_eq!(decoded.session_id, "s1");
        assert!(matches!(decoded.channel, Channel::Vnc));
    }
}
