//! Private claims carried by a session token.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warden_policy::AllowedScopes;

/// The authorization snapshot a session token carries.
///
/// Registered claims (`iat`, `exp`) are added by the codec when minting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Path prefix to permitted methods.
    pub allowed_scopes: AllowedScopes,
    /// Authenticated address.
    pub email: String,
    /// Roles held on the origin.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Identity provider extras such as a username.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, String>,
}

impl SessionClaims {
    /// Create claims for `email`.
    pub fn new(email: impl Into<String>, allowed_scopes: AllowedScopes) -> Self {
        Self {
            allowed_scopes,
            email: email.into(),
            roles: Vec::new(),
            extras: BTreeMap::new(),
        }
    }

    /// Set the roles.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Add an identity extra.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}
