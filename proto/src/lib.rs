//! Wire types and token cryptography shared by the manager, gateway and
//! agent binaries.

pub mod chunk;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod token;

pub use chunk::{Channel, StreamChunk};
pub use control::{AgentInfo, AgentStatus, BmcInfo, PowerOp, PowerState, RpcEnvelope, SensorReading, UnaryOp, UnaryResult};
pub use endpoint::{BmcProtocol, ControlEndpoint, EndpointKind, SolEndpoint, TlsConfig, VncEndpoint};
pub use error::PlatformError;
pub use token::{CustomerClaims, CustomerInfo, ServerClaims, ServerContext, TokenService};
