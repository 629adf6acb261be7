//! Resolved per-user permissions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::method::MethodSet;
use crate::prefix::longest_prefix;

/// A per-user permission snapshot: path prefix to permitted methods.
///
/// This is what a session token carries, serialized as a JSON object
/// `{"/path": ["GET", "POST"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowedScopes(BTreeMap<String, MethodSet>);

impl AllowedScopes {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `methods` into the entry for `path`.
    pub fn grant(&mut self, path: impl Into<String>, methods: &MethodSet) {
        self.0.entry(path.into()).or_default().extend(methods);
    }

    /// Methods granted at exactly `path`.
    pub fn get(&self, path: &str) -> Option<&MethodSet> {
        self.0.get(path)
    }

    /// Whether `method` on `path` is permitted.
    ///
    /// Uses the longest path key that prefixes `path`; the method set there
    /// must contain `method` or `*`.
    pub fn matches(&self, path: &str, method: &str) -> bool {
        longest_prefix(&self.0, path).is_some_and(|(_, methods)| methods.allows(method))
    }

    /// Whether nothing is granted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of path entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over path entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MethodSet)> {
        self.0.iter().map(|(path, methods)| (path.as_str(), methods))
    }
}

impl FromIterator<(String, MethodSet)> for AllowedScopes {
    fn from_iter<T: IntoIterator<Item = (String, MethodSet)>>(iter: T) -> Self {
        let mut scopes = Self::new();
        for (path, methods) in iter {
            scopes.grant(path, &methods);
        }
        scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn methods(list: &[&str]) -> MethodSet {
        MethodSet::new(list).unwrap()
    }

    #[test]
    fn test_longest_prefix_decides() {
        let scopes: AllowedScopes = [
            ("/".to_string(), methods(&["*"])),
            ("/admin".to_string(), methods(&["GET"])),
        ]
        .into_iter()
        .collect();

        assert!(scopes.matches("/admin/users", "GET"));
        assert!(!scopes.matches("/admin/users", "DELETE"));
        assert!(scopes.matches("/public", "DELETE"));
    }

    #[test]
    fn test_no_prefix_denies() {
        let scopes: AllowedScopes = [("/app".to_string(), methods(&["*"]))].into_iter().collect();
        assert!(!scopes.matches("/other", "GET"));
        assert!(!AllowedScopes::new().matches("/", "GET"));
    }

    #[test]
    fn test_grant_unions() {
        let mut scopes = AllowedScopes::new();
        scopes.grant("/", &methods(&["GET"]));
        scopes.grant("/", &methods(&["POST", "GET"]));
        assert_eq!(scopes.get("/").unwrap().len(), 2);
    }

    #[test]
    fn test_json_shape() {
        let scopes: AllowedScopes = [("/admin".to_string(), methods(&["GET"]))]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&scopes).unwrap();
        assert_eq!(json, r#"{"/admin":["GET"]}"#);
        let back: AllowedScopes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scopes);
    }
}
