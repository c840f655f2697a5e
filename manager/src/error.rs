//! Maps `PlatformError` onto HTTP status codes, same pattern as
//! `gateway::error`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bmc_proto::PlatformError;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError(pub PlatformError);

impl From<PlatformError> for ApiError {
    fn from(e: PlatformError) -> Self {
        Self(e)
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
