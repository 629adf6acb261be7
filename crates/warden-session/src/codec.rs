//! HS256 signing and verification of session tokens.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::Value;

use crate::claims::SessionClaims;
use crate::error::{SessionError, SessionResult};

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    claims: &'a SessionClaims,
    iat: i64,
    exp: i64,
}

/// A token whose signature and expiry have been checked.
///
/// Private claims are decoded separately with [`VerifiedToken::claims`] so a
/// corrupt payload can be told apart from a forged or expired token.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    payload: Value,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl VerifiedToken {
    /// Decode the private claims.
    pub fn claims(&self) -> SessionResult<SessionClaims> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| SessionError::claim_decode(e.to_string()))
    }

    /// When the token was minted.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the token stops being valid.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token predates `instant`.
    pub fn issued_before(&self, instant: DateTime<Utc>) -> bool {
        self.issued_at < instant
    }
}

/// Mints and verifies session tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec for `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign `claims`, issued now and valid for `ttl`.
    pub fn mint(&self, claims: &SessionClaims, ttl: Duration) -> SessionResult<String> {
        self.mint_at(claims, Utc::now(), ttl)
    }

    /// Sign `claims` with an explicit issue time.
    pub fn mint_at(
        &self,
        claims: &SessionClaims,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> SessionResult<String> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| SessionError::encode(format!("token lifetime out of range: {e}")))?;
        let envelope = Envelope {
            claims,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &envelope, &self.encoding)
            .map_err(|e| SessionError::encode(e.to_string()))
    }

    /// Check signature and expiry, with no clock leeway.
    pub fn verify(&self, token: &str) -> SessionResult<VerifiedToken> {
        let data = decode::<Value>(token, &self.decoding, &self.validation)?;
        let payload = data.claims;

        let issued_at = timestamp_claim(&payload, "iat")?;
        let expires_at = timestamp_claim(&payload, "exp")?;

        Ok(VerifiedToken {
            payload,
            issued_at,
            expires_at,
        })
    }
}

fn timestamp_claim(payload: &Value, name: &str) -> SessionResult<DateTime<Utc>> {
    payload
        .get(name)
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| SessionError::token(format!("missing or invalid {name} claim")))
}
