use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::IdentityClaim;
use crate::calendar::UserRole;
use crate::storage::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,
    #[error("Invalid token signature")]
    BadSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Unexpected token kind")]
    WrongKind,
    #[error("Invalid signing key")]
    InvalidKey,
    #[error("Failed to encode token claims: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: i64,
    role: UserRole,
    kind: TokenKind,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: i64,
    kind: TokenKind,
    jti: String,
    exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies compact HS256 tokens. Access and refresh tokens use separate secrets.
#[derive(Clone)]
pub struct TokenSigner {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret: access_secret.as_bytes().to_vec(),
            refresh_secret: refresh_secret.as_bytes().to_vec(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.access_secret,
            &config.refresh_secret,
            Duration::minutes(config.access_token_minutes),
            Duration::days(config.refresh_token_days),
        )
    }

    pub fn issue_access(&self, claim: &IdentityClaim) -> Result<String, TokenError> {
        self.issue_access_at(claim, Utc::now())
    }

    fn issue_access_at(&self, claim: &IdentityClaim, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = AccessClaims {
            sub: claim.user_id,
            role: claim.role,
            kind: TokenKind::Access,
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&self.access_secret, &claims)
    }

    pub fn issue_refresh(&self, user_id: i64) -> Result<IssuedRefreshToken, TokenError> {
        let expires_at = Utc::now() + self.refresh_ttl;
        let claims = RefreshClaims {
            sub: user_id,
            kind: TokenKind::Refresh,
            jti: Uuid::new_v4().to_string(),
            exp: expires_at.timestamp(),
        };
        Ok(IssuedRefreshToken {
            token: encode(&self.refresh_secret, &claims)?,
            expires_at,
        })
    }

    pub fn verify_access(&self, raw: &str) -> Result<IdentityClaim, TokenError> {
        let claims: AccessClaims = decode(&self.access_secret, raw)?;
        ensure_kind(claims.kind, TokenKind::Access)?;
        ensure_fresh(claims.exp)?;
        Ok(IdentityClaim::new(claims.sub, claims.role))
    }

    /// Returns the user id the refresh token was issued to.
    pub fn verify_refresh(&self, raw: &str) -> Result<i64, TokenError> {
        let claims: RefreshClaims = decode(&self.refresh_secret, raw)?;
        ensure_kind(claims.kind, TokenKind::Refresh)?;
        ensure_fresh(claims.exp)?;
        Ok(claims.sub)
    }
}

/// Refresh tokens are only ever persisted as this digest.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn ensure_kind(actual: TokenKind, expected: TokenKind) -> Result<(), TokenError> {
    if actual == expected {
        Ok(())
    } else {
        Err(TokenError::WrongKind)
    }
}

fn ensure_fresh(exp: i64) -> Result<(), TokenError> {
    if exp <= Utc::now().timestamp() {
        Err(TokenError::Expired)
    } else {
        Ok(())
    }
}

fn new_mac(secret: &[u8]) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)
}

fn encode<T: Serialize>(secret: &[u8], claims: &T) -> Result<String, TokenError> {
    let header = TokenHeader {
        alg: ALGORITHM.to_string(),
        typ: "JWT".to_string(),
    };
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{header}.{payload}");

    let mut mac = new_mac(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

fn decode<T: DeserializeOwned>(secret: &[u8], raw: &str) -> Result<T, TokenError> {
    let mut parts = raw.trim().split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header).map_err(|_| TokenError::Malformed)?;
    let parsed_header: TokenHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;
    if parsed_header.alg != ALGORITHM {
        return Err(TokenError::Malformed);
    }

    let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::Malformed)?;
    let mut mac = new_mac(secret)?;
    mac.update(format!("{header}.{payload}").as_bytes());
    mac.verify_slice(&signature).map_err(|_| TokenError::BadSignature)?;

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::Malformed)
}
