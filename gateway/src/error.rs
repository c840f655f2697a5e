//! Gateway error handling (spec §7): maps the shared `PlatformError`
//! vocabulary onto HTTP status codes for axum handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bmc_proto::PlatformError;
use serde_json::json;

pub struct ApiError(pub PlatformError);

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        Self(e)
    }
}

impl From<crate::session_store::SessionStoreError> for ApiError {
    fn from(e: crate::session_store::SessionStoreError) -> Self {
        use crate::session_store::SessionStoreError as E;
        match e {
            E::NotFound => ApiError(PlatformError::NotFound("session".into())),
            E::Expired => ApiError(PlatformError::AuthInvalid("session expired".into())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if matches!(self.0, PlatformError::InternalError(_)) {
            tracing::error!(error = %self.0, "internal error");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
