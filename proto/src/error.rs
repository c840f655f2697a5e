//! The error-kind vocabulary shared across Manager, Gateway and Agent
//! (spec §7). Each service maps this onto its own transport (HTTP status /
//! RPC status code); the kinds themselves are transport-agnostic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum PlatformError {
    #[error("no credentials presented")]
    AuthMissing,
    #[error("invalid credentials: {0}")]
    AuthInvalid(String),
    #[error("forbidden: {0}")]
    AuthForbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bmc error ({kind}): {message}")]
    BmcError { kind: String, message: String },
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl PlatformError {
    pub fn http_status(&self) -> u16 {
        match self {
            PlatformError::AuthMissing => 401,
            PlatformError::AuthInvalid(_) => 401,
            PlatformError::AuthForbidden(_) => 403,
            PlatformError::NotFound(_) => 404,
            PlatformError::Conflict(_) => 409,
            PlatformError::BmcError { .. } => 502,
            PlatformError::TransportError(_) => 502,
            PlatformError::InternalError(_) => 500,
        }
    }
}
