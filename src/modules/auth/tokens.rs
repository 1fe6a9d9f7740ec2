use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::Mac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::error::AuthError;
use super::model::AccountId;
use crate::config::AuthConfig;
use crate::HmacSha256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed payload. `jti` keeps two tokens minted in the same second
/// distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: AccountId,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// A freshly minted access/refresh pair
#[derive(Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}

/// Stateless signer/verifier for access and refresh tokens (HS256).
pub struct TokenIssuer {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_secret: config.access_secret.as_bytes().to_vec(),
            refresh_secret: config.refresh_secret.as_bytes().to_vec(),
            access_ttl: config.access_ttl(),
            refresh_ttl: config.refresh_ttl(),
        }
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn mac(&self, kind: TokenKind) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(self.secret(kind))
            .map_err(|e| AuthError::Internal(format!("invalid signing key: {}", e)))
    }

    /// Sign `{sub, iat, exp, jti}` for `account_id`
    pub fn issue(
        &self,
        kind: TokenKind,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<(String, Claims), AuthError> {
        let expires_at = now
            .checked_add_signed(self.ttl(kind))
            .ok_or_else(|| AuthError::Internal(format!("{:?} token expiry out of range", kind)))?;
        let mut jti = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut jti);
        let claims = Claims {
            sub: account_id.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: hex::encode(jti),
        };

        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| AuthError::Internal(format!("token header: {}", e)))?;
        let claims_json = serde_json::to_vec(&claims)
            .map_err(|e| AuthError::Internal(format!("token claims: {}", e)))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let mut mac = self.mac(kind)?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok((format!("{}.{}", signing_input, signature), claims))
    }

    pub fn issue_access(&self, account_id: &AccountId, now: DateTime<Utc>) -> Result<String, AuthError> {
        self.issue(TokenKind::Access, account_id, now).map(|(token, _)| token)
    }

    pub fn issue_refresh(&self, account_id: &AccountId, now: DateTime<Utc>) -> Result<String, AuthError> {
        self.issue(TokenKind::Refresh, account_id, now).map(|(token, _)| token)
    }

    /// Check shape, signature and expiry.
    pub fn verify(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        let mut parts = token.trim().split('.');
        let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::TokenInvalid);
        };

        let header: Header = decode_segment(header_b64)?;
        if header.alg != "HS256" || !header.typ.eq_ignore_ascii_case("JWT") {
            return Err(AuthError::TokenInvalid);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::TokenInvalid)?;
        let mut mac = self.mac(kind)?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::TokenInvalid)?;

        let claims: Claims = decode_segment(claims_b64)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::TokenExpired);
        }
        Ok(claims)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::TokenInvalid)?;
    serde_json::from_slice(&raw).map_err(|_| AuthError::TokenInvalid)
}

/// One-way digest used for everything stored in place of a secret
pub fn digest_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// A random value handed to the user by email. Only the digest is kept.
pub struct SecretToken {
    raw: String,
    digest: String,
}

impl SecretToken {
    fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);
        let digest = digest_token(&raw);
        Self { raw, digest }
    }

    pub fn verification() -> Self {
        Self::generate(40)
    }

    pub fn password_reset() -> Self {
        Self::generate(32)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(<redacted>)")
    }
}
