//! BMC endpoint data model (spec §3: `ControlEndpoint` / `SOLEndpoint` /
//! `VNCEndpoint`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BmcProtocol {
    Ipmi,
    Redfish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointKind {
    Redfish,
    RedfishSerial,
    RedfishWebSocket,
    Ipmi,
    VncNative,
    VncWebSocket,
}

impl EndpointKind {
    /// Infers the endpoint kind from a URI scheme when the caller didn't
    /// tag one explicitly (spec §3: "kind is inferred from URI scheme when
    /// absent").
    pub fn infer(uri: &str, is_vnc: bool) -> Self {
        if let Some(rest) = uri.strip_prefix("ws://").or_else(|| uri.strip_prefix("wss://")) {
            let _ = rest;
            return if is_vnc { EndpointKind::VncWebSocket } else { EndpointKind::RedfishWebSocket };
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return if is_vnc { EndpointKind::RedfishWebSocket } else { EndpointKind::Redfish };
        }
        if is_vnc {
            EndpointKind::VncNative
        } else {
            EndpointKind::Ipmi
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub verify: bool,
    pub ca_cert_pem: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlEndpoint {
    pub kind: EndpointKind,
    pub uri: String,
    pub username: String,
    pub password: String,
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolEndpoint {
    pub kind: EndpointKind,
    pub uri: String,
    pub username: String,
    pub password: String,
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VncEndpoint {
    pub kind: EndpointKind,
    pub uri: String,
    pub username: String,
    pub password: String,
    pub tls: Option<TlsConfig>,
}
