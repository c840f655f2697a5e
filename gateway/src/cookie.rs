//! Session cookie policy (spec §4.3).
//!
//! axum doesn't speak cookies itself; `axum-extra`'s `CookieJar` is the
//! pack's standard add-on for this (e.g. the other axum-based gateways in
//! the retrieval pack layer cookie/session concerns the same way).

use axum_extra::extract::cookie::{Cookie, SameSite};
use std::time::Duration as StdDuration;

pub const COOKIE_NAME: &str = "gateway_session";
pub const SESSION_HEADER: &str = "x-session-id";

/// Whether the inbound request arrived over HTTPS: checked via
/// `X-Forwarded-Proto` since axum terminates plaintext HTTP behind a
/// TLS-terminating load balancer in the common deployment shape; a
/// directly-terminated TLS listener would instead inspect the connection's
/// TLS state before calling this.
pub fn is_https(forwarded_proto: Option<&str>) -> bool {
    forwarded_proto.map(|p| p.eq_ignore_ascii_case("https")).unwrap_or(false)
}

/// Builds the `Set-Cookie` cookie for a session id, per spec §4.3: HttpOnly
/// always; Secure+SameSite=Strict over HTTPS, else Secure=false+Lax.
pub fn session_cookie(session_id: &str, https: bool, max_age: StdDuration) -> Cookie<'static> {
    let mut cookie = Cookie::new(COOKIE_NAME, session_id.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_max_age(Some(time::Duration::seconds(max_age.as_secs() as i64)));
    if https {
        cookie.set_secure(true);
        cookie.set_same_site(SameSite::Strict);
    } else {
        cookie.set_secure(false);
        cookie.set_same_site(SameSite::Lax);
    }
    cookie
}

/// A `Set-Cookie` that deletes the session cookie (MaxAge=-1, spec §4.3).
pub fn delete_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(COOKIE_NAME, "");
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_max_age(Some(time::Duration::seconds(-1)));
    cookie
}

/// Session id extraction order: cookie first, then the debug header
/// (spec §4.3).
pub fn extract_session_id(cookie_value: Option<&str>, header_value: Option<&str>) -> Option<String> {
    cookie_value.or(header_value).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_request_gets_secure_strict_cookie() {
        let c = session_cookie("abc", true, StdDuration::from_secs(60));
        assert!(c.http_only().unwrap_or(false));
        assert!(c.secure().unwrap_or(false));
        assert_eq!(c.same_site(), Some(SameSite::Strict));
    }

    #[test]
    fn http_request_gets_lax_insecure_cookie() {
        let c = session_cookie("abc", false, StdDuration::from_secs(60));
        assert!(c.http_only().unwrap_or(false));
        assert!(!c.secure().unwrap_or(true));
        assert_eq!(c.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn cookie_takes_precedence_over_header() {
        let id = extract_session_id(Some("from-cookie"), Some("from-header"));
        assert_eq!(id.as_deref(), Some("from-cookie"));
    }

    #[test]
    fn header_used_when_no_cookie() {
        let id = extract_session_id(None, Some("from-header"));
        assert_eq!(id.as_deref(), Some("from-header"));
    }

    #[test]
    fn forwarded_proto_detects_https() {
        assert!(is_https(Some("https")));
        assert!(!is_https(Some("http")));
        assert!(!is_https(None));
    }
}
