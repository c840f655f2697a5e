//! BMC Driver (spec §4.7): a tagged dispatch over the two control
//! protocols this spec names, exposing the unary ops (`power`, `sensors`,
//! `info`) the Stream Bridge's sibling RPC path needs.
//!
//! Redfish goes over `reqwest` (the pack's standard HTTPS JSON client, e.g.
//! `mcp-bouncer-core`'s clients). IPMI is stubbed behind the same trait:
//! full RMCP+ session negotiation is out of scope (spec.md only asks for a
//! uniform dispatch pattern here), but the wire constants a real driver
//! would need are documented alongside the stub.

use async_trait::async_trait;
use bmc_proto::control::{BmcInfo, PowerOp, PowerState, SensorReading};
use bmc_proto::{ControlEndpoint, PlatformError};
use serde::Deserialize;

#[async_trait]
pub trait BmcTransport: Send + Sync {
    async fn power(&self, op: PowerOp) -> Result<PowerState, PlatformError>;
    async fn sensors(&self) -> Result<Vec<SensorReading>, PlatformError>;
    async fn info(&self) -> Result<BmcInfo, PlatformError>;
}

pub enum BmcDriver {
    Ipmi(IpmiDriver),
    Redfish(RedfishDriver),
}

impl BmcDriver {
    pub fn for_endpoint(endpoint: &ControlEndpoint) -> Self {
        if is_redfish(endpoint) {
            BmcDriver::Redfish(RedfishDriver::new(endpoint))
        } else {
            BmcDriver::Ipmi(IpmiDriver::new(endpoint))
        }
    }

    pub async fn power(&self, op: PowerOp) -> Result<PowerState, PlatformError> {
        match self {
            BmcDriver::Ipmi(d) => d.power(op).await,
            BmcDriver::Redfish(d) => d.power(op).await,
        }
    }

    pub async fn sensors(&self) -> Result<Vec<SensorReading>, PlatformError> {
        match self {
            BmcDriver::Ipmi(d) => d.sensors().await,
            BmcDriver::Redfish(d) => d.sensors().await,
        }
    }

    pub async fn info(&self) -> Result<BmcInfo, PlatformError> {
        match self {
            BmcDriver::Ipmi(d) => d.info().await,
            BmcDriver::Redfish(d) => d.info().await,
        }
    }
}

fn is_redfish(endpoint: &ControlEndpoint) -> bool {
    use bmc_proto::EndpointKind::*;
    matches!(endpoint.kind, Redfish | RedfishSerial | RedfishWebSocket)
}

// ── Redfish ──────────────────────────────────────────────────────

pub struct RedfishDriver {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct RedfishSystem {
    #[serde(rename = "PowerState")]
    power_state: Option<String>,
    #[serde(rename = "Manufacturer")]
    manufacturer: Option<String>,
    #[serde(rename = "Model")]
    model: Option<String>,
    #[serde(rename = "BiosVersion")]
    bios_version: Option<String>,
}

#[derive(Deserialize)]
struct RedfishThermal {
    #[serde(rename = "Temperatures", default)]
    temperatures: Vec<RedfishTemperature>,
}

#[derive(Deserialize)]
struct RedfishTemperature {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "ReadingCelsius")]
    reading_celsius: Option<f64>,
}

impl RedfishDriver {
    pub fn new(endpoint: &ControlEndpoint) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(tls) = &endpoint.tls {
            if !tls.verify {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }
        Self {
            base_url: endpoint.uri.trim_end_matches('/').to_string(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            http: builder.build().unwrap_or_default(),
        }
    }

    fn systems_url(&self) -> String {
        format!("{}/redfish/v1/Systems/1", self.base_url)
    }

    async fn get_system(&self) -> Result<RedfishSystem, PlatformError> {
        let resp = self
            .http
            .get(self.systems_url())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| PlatformError::BmcError { kind: "redfish".into(), message: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(PlatformError::BmcError { kind: "redfish".into(), message: format!("Systems returned {}", resp.status()) });
        }
        resp.json().await.map_err(|e| PlatformError::BmcError { kind: "redfish".into(), message: e.to_string() })
    }
}

#[async_trait]
impl BmcTransport for RedfishDriver {
    async fn power(&self, op: PowerOp) -> Result<PowerState, PlatformError> {
        if matches!(op, PowerOp::Status) {
            let system = self.get_system().await?;
            return Ok(parse_power_state(system.power_state.as_deref()));
        }
        let reset_type = match op {
            PowerOp::On => "On",
            PowerOp::Off => "ForceOff",
            PowerOp::Cycle => "PowerCycle",
            PowerOp::Reset => "ForceRestart",
            PowerOp::Status => unreachable!(),
        };
        let url = format!("{}/Actions/ComputerSystem.Reset", self.systems_url());
        let resp = self
            .http
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({ "ResetType": reset_type }))
            .send()
            .await
            .map_err(|e| PlatformError::BmcError { kind: "redfish".into(), message: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(PlatformError::BmcError { kind: "redfish".into(), message: format!("reset returned {}", resp.status()) });
        }
        let system = self.get_system().await?;
        Ok(parse_power_state(system.power_state.as_deref()))
    }

    async fn sensors(&self) -> Result<Vec<SensorReading>, PlatformError> {
        let url = format!("{}/Thermal", self.base_url.replace("/Systems/", "/Chassis/"));
        let resp = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| PlatformError::BmcError { kind: "redfish".into(), message: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(PlatformError::BmcError { kind: "redfish".into(), message: format!("Thermal returned {}", resp.status()) });
        }
        let thermal: RedfishThermal = resp.json().await.map_err(|e| PlatformError::BmcError { kind: "redfish".into(), message: e.to_string() })?;
        Ok(thermal
            .temperatures
            .into_iter()
            .filter_map(|t| t.reading_celsius.map(|v| SensorReading { name: t.name, value: v, unit: "Celsius".into() }))
            .collect())
    }

    async fn info(&self) -> Result<BmcInfo, PlatformError> {
        let system = self.get_system().await?;
        Ok(BmcInfo {
            vendor: system.manufacturer.unwrap_or_else(|| "unknown".into()),
            model: system.model.unwrap_or_else(|| "unknown".into()),
            firmware_version: system.bios_version.unwrap_or_else(|| "unknown".into()),
        })
    }
}

fn parse_power_state(value: Option<&str>) -> PowerState {
    match value {
        Some("On") => PowerState::On,
        Some("Off") => PowerState::Off,
        _ => PowerState::Unknown,
    }
}

// ── IPMI ─────────────────────────────────────────────────────────

/// RMCP+ session negotiation and the IPMI 2.0 wire format are out of scope;
/// these are the constants a real driver would build requests from.
#[allow(dead_code)]
mod ipmi_wire {
    pub const NETFN_CHASSIS: u8 = 0x00;
    pub const NETFN_SENSOR_EVENT: u8 = 0x04;
    pub const CMD_CHASSIS_CONTROL: u8 = 0x02;
    pub const CMD_GET_CHASSIS_STATUS: u8 = 0x01;
    pub const CMD_GET_SENSOR_READING: u8 = 0x2d;
}

pub struct IpmiDriver {
    endpoint_uri: String,
}

impl IpmiDriver {
    pub fn new(endpoint: &ControlEndpoint) -> Self {
        Self { endpoint_uri: endpoint.uri.clone() }
    }
}

#[async_trait]
impl BmcTransport for IpmiDriver {
    async fn power(&self, _op: PowerOp) -> Result<PowerState, PlatformError> {
        Err(PlatformError::BmcError { kind: "ipmi".into(), message: format!("RMCP+ not implemented for {}", self.endpoint_uri) })
    }

    async fn sensors(&self) -> Result<Vec<SensorReading>, PlatformError> {
        Err(PlatformError::BmcError { kind: "ipmi".into(), message: format!("RMCP+ not implemented for {}", self.endpoint_uri) })
    }

    async fn info(&self) -> Result<BmcInfo, PlatformError> {
        Err(PlatformError::BmcError { kind: "ipmi".into(), message: format!("RMCP+ not implemented for {}", self.endpoint_uri) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmc_proto::EndpointKind;

    fn redfish_endpoint() -> ControlEndpoint {
        ControlEndpoint { kind: EndpointKind::Redfish, uri: "https://bmc.local".into(), username: "admin".into(), password: "pw".into(), tls: None }
    }

    fn ipmi_endpoint() -> ControlEndpoint {
        ControlEndpoint { kind: EndpointKind::Ipmi, uri: "10.0.0.5:623".into(), username: "admin".into(), password: "pw".into(), tls: None }
    }

    #[test]
    fn dispatches_to_redfish_for_redfish_endpoints() {
        let driver = BmcDriver::for_endpoint(&redfish_endpoint());
        assert!(matches!(driver, BmcDriver::Redfish(_)));
    }

    #[test]
    fn dispatches_to_ipmi_for_ipmi_endpoints() {
        let driver = BmcDriver::for_endpoint(&ipmi_endpoint());
        assert!(matches!(driver, BmcDriver::Ipmi(_)));
    }

    #[tokio::test]
    async fn ipmi_power_is_a_documented_stub_error() {
        let driver = BmcDriver::for_endpoint(&ipmi_endpoint());
        let err = driver.power(PowerOp::On).await.unwrap_err();
        assert!(matches!(err, PlatformError::BmcError { .. }));
    }

    #[test]
    fn parses_known_power_states() {
        assert_eq!(parse_power_state(Some("On")), PowerState::On);
        assert_eq!(parse_power_state(Some("Off")), PowerState::Off);
        assert_eq!(parse_power_state(Some("Paused")), PowerState::Unknown);
        assert_eq!(parse_power_state(None), PowerState::Unknown);
    }
}
