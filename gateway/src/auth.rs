//! Authentication at the boundary (spec §6): a customer token arrives
//! either as `Authorization: Bearer <jwt>` or as the `gateway_session`
//! cookie. The cookie wins when both are present and its session is live;
//! otherwise the header is used.

use crate::cookie::COOKIE_NAME;
use crate::state::AppState;
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use bmc_proto::{CustomerClaims, PlatformError};

pub async fn resolve_customer_jwt(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Result<String, PlatformError> {
    if let Some(cookie) = jar.get(COOKIE_NAME) {
        if let Ok(session) = state.sessions.get(cookie.value()).await {
            return Ok(session.customer_jwt);
        }
    }
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Ok(token.to_string());
            }
        }
    }
    Err(PlatformError::AuthMissing)
}

pub async fn authenticate(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Result<CustomerClaims, PlatformError> {
    let jwt = resolve_customer_jwt(state, jar, headers).await?;
    state.tokens.validate_customer_token(&jwt)
}

/// Admin endpoints require a customer token whose claims include
/// `is_admin=true` (spec §6).
pub async fn authenticate_admin(state: &AppState, jar: &CookieJar, headers: &HeaderMap) -> Result<CustomerClaims, PlatformError> {
    let claims = authenticate(state, jar, headers).await?;
    if !claims.is_admin {
        return Err(PlatformError::AuthForbidden("admin privileges required".into()));
    }
    Ok(claims)
}
