//! Error types for the policy crate.

use thiserror::Error;

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors raised while building a policy pool.
///
/// Every variant is a configuration problem: a pool that fails to build is
/// never served.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyError {
    /// An email pattern could not be accepted.
    #[error("invalid email pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An origin key is not a `scheme://host` URL.
    #[error("invalid origin {origin:?}: {reason}")]
    InvalidOrigin {
        /// The offending origin key.
        origin: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two origin keys normalize to the same origin.
    #[error("duplicate origin {origin:?} in access-control list")]
    DuplicateOrigin {
        /// The normalized origin.
        origin: String,
    },

    /// A method is not a valid HTTP method token.
    #[error("invalid method {method:?}")]
    InvalidMethod {
        /// The offending method.
        method: String,
    },

    /// A token expiry value could not be parsed.
    #[error("invalid jwt_expiry_in {value:?}: {reason}")]
    InvalidExpiry {
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl PolicyError {
    /// Create an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid origin error.
    pub fn invalid_origin(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOrigin {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    /// Create a duplicate origin error.
    pub fn duplicate_origin(origin: impl Into<String>) -> Self {
        Self::DuplicateOrigin {
            origin: origin.into(),
        }
    }

    /// Create an invalid method error.
    pub fn invalid_method(method: impl Into<String>) -> Self {
        Self::InvalidMethod {
            method: method.into(),
        }
    }

    /// Create an invalid expiry error.
    pub fn invalid_expiry(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidExpiry {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_error() {
        let err = PolicyError::invalid_pattern("a*b*", "more than one wildcard");
        assert!(err.to_string().contains("a*b*"));
        assert!(err.to_string().contains("more than one wildcard"));
    }

    #[test]
    fn test_duplicate_origin_error() {
        let err = PolicyError::duplicate_origin("http://example.com");
        assert!(err.to_string().contains("http://example.com"));
    }

    #[test]
    fn test_invalid_expiry_error() {
        let err = PolicyError::invalid_expiry("3x", "unknown unit");
        assert_eq!(err.to_string(), "invalid jwt_expiry_in \"3x\": unknown unit");
    }
}
