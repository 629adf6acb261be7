//! Error types for session tokens.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session token errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    /// The token is malformed, badly signed or lacks required claims.
    #[error("Invalid session token: {reason}")]
    Token {
        /// What failed.
        reason: String,
    },

    /// The token's `exp` has passed.
    #[error("Session token expired")]
    Expired,

    /// Signature was valid but the private claims could not be decoded.
    #[error("Failed to decode session claims: {reason}")]
    ClaimDecode {
        /// Decoder message.
        reason: String,
    },

    /// Signing failed.
    #[error("Failed to encode session token: {reason}")]
    Encode {
        /// Encoder message.
        reason: String,
    },
}

impl SessionError {
    /// Create a token error.
    pub fn token(reason: impl Into<String>) -> Self {
        Self::Token {
            reason: reason.into(),
        }
    }

    /// Create a claim decode error.
    pub fn claim_decode(reason: impl Into<String>) -> Self {
        Self::ClaimDecode {
            reason: reason.into(),
        }
    }

    /// Create an encode error.
    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }

    /// Whether the client should be sent to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Token { .. } | Self::Expired)
    }

    /// Whether the token had merely expired.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::token("invalid signature"),
            ErrorKind::InvalidAlgorithm => Self::token("unsupported algorithm"),
            ErrorKind::MissingRequiredClaim(claim) => {
                Self::token(format!("missing required claim {claim}"))
            }
            _ => Self::token(err.to_string()),
        }
    }
}
