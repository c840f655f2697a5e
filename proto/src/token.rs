//! Token Service (spec §4.1): issues and validates customer and
//! server-scoped JWTs, and seals/opens the encrypted `ServerContext`
//! capability carried inside a server-scoped token.
//!
//! Lives in `bmc-proto` rather than only in the manager because both the
//! Manager (issuer) and the Gateway (validator) hold the shared secret and
//! need the identical encode/decode logic (spec §4.1 design rationale:
//! "Gateways hold only the shared secret... any component holding the
//! secret can peek").

use crate::endpoint::BmcProtocol;
use crate::error::PlatformError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const CUSTOMER_TOKEN_LIFETIME_HOURS: i64 = 24;
const SERVER_TOKEN_LIFETIME_HOURS: i64 = 1;
const NONCE_LEN: usize = 12;

/// The server-scoped capability sealed inside a server token (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerContext {
    pub server_id: String,
    pub customer_id: String,
    pub bmc_endpoint: String,
    pub bmc_protocol: BmcProtocol,
    pub datacenter_id: String,
    pub features: Vec<String>,
    pub permissions: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerClaims {
    pub customer_id: String,
    pub email: String,
    pub jti: Uuid,
    #[serde(default)]
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerClaims {
    pub customer_id: String,
    pub server_id: String,
    pub iat: i64,
    pub exp: i64,
    /// Base64url(nonce || ciphertext) of a sealed `ServerContext`, absent
    /// only in malformed/legacy tokens.
    pub server_context: Option<String>,
}

pub struct CustomerInfo {
    pub customer_id: String,
    pub email: String,
    pub is_admin: bool,
}

/// Stateless holder of the shared HMAC/AES secret (spec §5: "The Token
/// Service is stateless; its key material is shared immutably after
/// construction").
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    aes_key: [u8; 32],
}

impl TokenService {
    /// Fails if `secret` is empty (spec §4.1: "Fails if the signing secret
    /// is empty").
    pub fn new(secret: impl Into<String>) -> Result<Self, PlatformError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(PlatformError::InternalError("empty signing secret".into()));
        }
        Ok(Self { aes_key: derive_key(&secret), secret })
    }

    pub fn generate_customer_token(&self, customer: &CustomerInfo) -> Result<String, PlatformError> {
        let now = Utc::now();
        let claims = CustomerClaims {
            customer_id: customer.customer_id.clone(),
            email: customer.email.clone(),
            jti: Uuid::new_v4(),
            is_admin: customer.is_admin,
            iat: now.timestamp(),
            exp: (now + Duration::hours(CUSTOMER_TOKEN_LIFETIME_HOURS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| PlatformError::InternalError(format!("sign customer token: {e}")))
    }

    pub fn validate_customer_token(&self, token: &str) -> Result<CustomerClaims, PlatformError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        let data = decode::<CustomerClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map_err(|e| PlatformError::AuthInvalid(e.to_string()))?;
        Ok(data.claims)
    }

    pub fn generate_server_token(
        &self,
        customer_id: &str,
        server_id: &str,
        bmc_endpoint: &str,
        bmc_protocol: BmcProtocol,
        datacenter_id: &str,
        features: Vec<String>,
        permissions: Vec<String>,
    ) -> Result<String, PlatformError> {
        let now = Utc::now();
        let expires_at = now + Duration::hours(SERVER_TOKEN_LIFETIME_HOURS);
        let ctx = ServerContext {
            server_id: server_id.to_string(),
            customer_id: customer_id.to_string(),
            bmc_endpoint: bmc_endpoint.to_string(),
            bmc_protocol,
            datacenter_id: datacenter_id.to_string(),
            features,
            permissions,
            issued_at: now,
            expires_at,
        };
        let sealed = self.encrypt_server_context(&ctx)?;
        let claims = ServerClaims {
            customer_id: customer_id.to_string(),
            server_id: server_id.to_string(),
            iat: now.timestamp(),
            // Outer exp equals the inner expires_at (spec §4.1).
            exp: expires_at.timestamp(),
            server_context: Some(sealed),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| PlatformError::InternalError(format!("sign server token: {e}")))
    }

    pub fn validate_server_token(&self, token: &str) -> Result<(ServerClaims, Option<ServerContext>), PlatformError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        let data = decode::<ServerClaims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map_err(|e| PlatformError::AuthInvalid(e.to_string()))?;
        let claims = data.claims;
        let ctx = match &claims.server_context {
            None => None,
            Some(sealed) => Some(self.decrypt_server_context(sealed)?),
        };
        Ok((claims, ctx))
    }

    pub fn encrypt_server_context(&self, ctx: &ServerContext) -> Result<String, PlatformError> {
        let plaintext = serde_json::to_vec(ctx).map_err(|e| PlatformError::InternalError(e.to_string()))?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.aes_key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| PlatformError::InternalError(format!("seal server context: {e}")))?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(B64.encode(sealed))
    }

    pub fn decrypt_server_context(&self, sealed_b64: &str) -> Result<ServerContext, PlatformError> {
        let sealed = B64.decode(sealed_b64).map_err(|e| PlatformError::AuthInvalid(e.to_string()))?;
        if sealed.len() < NONCE_LEN {
            return Err(PlatformError::AuthInvalid("sealed context too short".into()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.aes_key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| PlatformError::AuthInvalid("decrypt server context".into()))?;
        let ctx: ServerContext = serde_json::from_slice(&plaintext).map_err(|e| PlatformError::AuthInvalid(e.to_string()))?;
        // Enforced here, not only by callers, so nothing that holds the
        // shared secret can observe an expired capability (spec §8.4).
        if ctx.expires_at <= Utc::now() {
            return Err(PlatformError::AuthInvalid("server context expired".into()));
        }
        Ok(ctx)
    }
}

/// Zero-pad or truncate the operator's secret to exactly 32 bytes
/// (spec §3, §9: "document this clearly and prefer the operator supplying
/// exactly 32 bytes").
fn derive_key(secret: &str) -> [u8; 32] {
    let bytes = secret.as_bytes();
    let mut key = [0u8; 32];
    let n = bytes.len().min(32);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("super-secret-shared-key").unwrap()
    }

    fn sample_ctx() -> ServerContext {
        let now = Utc::now();
        ServerContext {
            server_id: "bmc-dc1-host01".into(),
            customer_id: "cust-1".into(),
            bmc_endpoint: "https://bmc.local/redfish/v1".into(),
            bmc_protocol: BmcProtocol::Redfish,
            datacenter_id: "dc1".into(),
            features: vec!["sol".into(), "vnc".into()],
            permissions: vec!["power".into()],
            issued_at: now.checked_sub_signed(Duration::seconds(now.timestamp_subsec_nanos() as i64 / 1_000_000_000)).unwrap_or(now),
            expires_at: now + Duration::hours(1),
        }
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(TokenService::new("").is_err());
    }

    #[test]
    fn customer_token_validation_is_stable_across_calls() {
        let svc = service();
        let token = svc
            .generate_customer_token(&CustomerInfo { customer_id: "c1".into(), email: "alice@co".into(), is_admin: false })
            .unwrap();
        let a = svc.validate_customer_token(&token).unwrap();
        let b = svc.validate_customer_token(&token).unwrap();
        assert_eq!(a.customer_id, b.customer_id);
        assert_eq!(a.email, b.email);
        assert_eq!(a.jti, b.jti);
    }

    #[test]
    fn server_context_roundtrips_to_whole_second_precision() {
        let svc = service();
        let ctx = sample_ctx();
        let sealed = svc.encrypt_server_context(&ctx).unwrap();
        let opened = svc.decrypt_server_context(&sealed).unwrap();
        assert_eq!(ctx.server_id, opened.server_id);
        assert_eq!(ctx.customer_id, opened.customer_id);
        assert_eq!(ctx.bmc_endpoint, opened.bmc_endpoint);
        assert_eq!(ctx.issued_at.timestamp(), opened.issued_at.timestamp());
        assert_eq!(ctx.expires_at.timestamp(), opened.expires_at.timestamp());
    }

    #[test]
    fn same_context_encrypted_twice_has_fresh_nonce_but_same_plaintext() {
        let svc = service();
        let ctx = sample_ctx();
        let a = svc.encrypt_server_context(&ctx).unwrap();
        let b = svc.encrypt_server_context(&ctx).unwrap();
        assert_ne!(a, b);
        assert_eq!(svc.decrypt_server_context(&a).unwrap(), svc.decrypt_server_context(&b).unwrap());
    }

    #[test]
    fn expired_context_fails_validation() {
        let svc = service();
        let mut ctx = sample_ctx();
        ctx.expires_at = Utc::now() - Duration::seconds(1);
        let sealed = svc.encrypt_server_context(&ctx).unwrap();
        // Outer exp left far in the future so only the inner expiry check fires.
        let claims = ServerClaims { customer_id: ctx.customer_id.clone(), server_id: ctx.server_id.clone(), iat: 0, exp: i64::MAX, server_context: Some(sealed) };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(svc.secret.as_bytes())).unwrap();
        let result = svc.validate_server_token(&token);
        assert!(matches!(result, Err(PlatformError::AuthInvalid(_))));

        // A freshly minted token with a non-expired context still validates.
        let fresh = svc
            .generate_server_token(&ctx.customer_id, &ctx.server_id, &ctx.bmc_endpoint, ctx.bmc_protocol, &ctx.datacenter_id, ctx.features.clone(), ctx.permissions.clone())
            .unwrap();
        assert!(svc.validate_server_token(&fresh).is_ok());
    }

    #[test]
    fn decrypt_server_context_rejects_an_expired_context_directly() {
        let svc = service();
        let mut ctx = sample_ctx();
        ctx.expires_at = Utc::now() - Duration::seconds(1);
        let sealed = svc.encrypt_server_context(&ctx).unwrap();
        assert!(matches!(svc.decrypt_server_context(&sealed), Err(PlatformError::AuthInvalid(_))));
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let a = TokenService::new("key-aaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let b = TokenService::new("key-bbbbbbbbbbbbbbbbbbbbbbbb").unwrap();
        let sealed = a.encrypt_server_context(&sample_ctx()).unwrap();
        assert!(b.decrypt_server_context(&sealed).is_err());
    }

    #[test]
    fn wrong_signing_key_fails_jwt_validation() {
        let a = TokenService::new("signer-key-one").unwrap();
        let b = TokenService::new("signer-key-two").unwrap();
        let token = a
            .generate_customer_token(&CustomerInfo { customer_id: "c1".into(), email: "alice@co".into(), is_admin: false })
            .unwrap();
        assert!(b.validate_customer_token(&token).is_err());
    }

    #[test]
    fn absent_server_context_claim_is_not_an_error() {
        let svc = service();
        let claims = ServerClaims { customer_id: "c1".into(), server_id: "s1".into(), iat: 0, exp: Utc::now().timestamp() + 3600, server_context: None };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(svc.secret.as_bytes())).unwrap();
        let (_, ctx) = svc.validate_server_token(&token).unwrap();
        assert!(ctx.is_none());
    }
}
