//! JWT Token Codec
//! Mission: Issue and validate signed bearer tokens without consulting any external state

use crate::auth::models::Claims;
use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Token-level failures. All of them surface to clients as the same generic 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("malformed token")]
    MalformedToken,
    #[error("token signature does not verify")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

/// A freshly signed token together with its lifetime
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
    pub expires_in: u64,
}

/// Signs and verifies HS256 tokens.
///
/// Validation is a pure function of `(token, secret, now)`: expiry is checked
/// against the caller-supplied `now`, never the system clock.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
    skew_secs: i64,
}

impl TokenCodec {
    /// Create a codec from the signing secret, token TTL and clock-skew tolerance
    pub fn new(secret: &str, ttl: Duration, clock_skew: Duration) -> Result<Self> {
        ensure!(!secret.is_empty(), "JWT secret must not be empty");
        let ttl_secs = i64::try_from(ttl.as_secs()).context("Token TTL out of range")?;
        let skew_secs = i64::try_from(clock_skew.as_secs()).context("Clock skew out of range")?;
        // expiresAt > issuedAt must hold for every token
        ensure!(ttl_secs > 0, "Token TTL must be at least one second");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
            skew_secs,
        })
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs as u64
    }

    /// Build and sign a token for `username` carrying `authorities`
    pub fn issue(
        &self,
        username: &str,
        authorities: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken> {
        let iat = now.timestamp();
        let exp = iat
            .checked_add(self.ttl_secs)
            .context("Invalid expiration timestamp")?;

        let claims = Claims {
            sub: username.to_string(),
            iat,
            exp,
            authorities: authorities.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign JWT")?;

        debug!(
            username = %username,
            expires_in_secs = self.ttl_secs,
            "Issued token"
        );

        Ok(IssuedToken {
            token,
            claims,
            expires_in: self.ttl_secs as u64,
        })
    }

    /// Verify the signature, then the structure, then the expiry of `token`
    ///
    /// The header is parsed before the signature can be checked, so a
    /// damaged header reports `MalformedToken`; any change to the payload
    /// or signature reports `BadSignature`. Callers answer both with the
    /// same 401.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the supplied clock
        validation.validate_exp = false;
        validation.leeway = 0;

        let decoded = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                _ => AuthError::MalformedToken,
            }
        })?;
        let claims = decoded.claims;

        if claims.exp <= claims.iat {
            return Err(AuthError::MalformedToken);
        }
        if now.timestamp() >= claims.exp.saturating_add(self.skew_secs) {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}
