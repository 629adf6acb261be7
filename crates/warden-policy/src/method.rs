//! Canonical sets of HTTP methods.

use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// Method entry that allows every method.
pub const ANY_METHOD: &str = "*";

/// An ordered, de-duplicated, upper-case set of HTTP methods.
///
/// May contain [`ANY_METHOD`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct MethodSet(Vec<String>);

impl MethodSet {
    /// Build a canonical set, keeping the first occurrence of each method.
    pub fn new<I, S>(methods: I) -> PolicyResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for method in methods {
            set.insert(canonical_method(method.as_ref())?);
        }
        Ok(set)
    }

    /// Whether the set names `method` itself.
    pub fn contains(&self, method: &str) -> bool {
        self.0.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Whether `method` is permitted: listed, or `*` is listed.
    pub fn allows(&self, method: &str) -> bool {
        self.contains(method) || self.contains(ANY_METHOD)
    }

    /// Union `other` into this set.
    pub fn extend(&mut self, other: &MethodSet) {
        for method in &other.0 {
            self.insert(method.clone());
        }
    }

    /// Iterate over the methods.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of methods.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, method: String) {
        if !self.0.contains(&method) {
            self.0.push(method);
        }
    }
}

fn canonical_method(method: &str) -> PolicyResult<String> {
    let method = method.trim();
    if method.is_empty() || !method.bytes().all(is_token_byte) {
        return Err(PolicyError::invalid_method(method));
    }
    Ok(method.to_ascii_uppercase())
}

// RFC 9110 token characters; `*` is one of them.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

impl TryFrom<Vec<String>> for MethodSet {
    type Error = PolicyError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MethodSet> for Vec<String> {
    fn from(set: MethodSet) -> Self {
        set.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_and_dedupes() {
        let set = MethodSet::new(["get", "GET", "post", "Get"]).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["GET", "POST"]);
    }

    #[test]
    fn test_allows_with_wildcard() {
        let set = MethodSet::new(["*"]).unwrap();
        assert!(set.allows("DELETE"));
        assert!(!set.contains("DELETE"));
    }

    #[test]
    fn test_allows_listed_only() {
        let set = MethodSet::new(["GET"]).unwrap();
        assert!(set.allows("GET"));
        assert!(set.allows("get"));
        assert!(!set.allows("POST"));
    }

    #[test]
    fn test_rejects_invalid_method() {
        assert!(MethodSet::new(["GE T"]).is_err());
        assert!(MethodSet::new([""]).is_err());
    }

    #[test]
    fn test_extend() {
        let mut set = MethodSet::new(["GET"]).unwrap();
        set.extend(&MethodSet::new(["POST", "GET"]).unwrap());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_serde_canonicalizes() {
        let set: MethodSet = serde_json::from_str(r#"["get","put","GET"]"#).unwrap();
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["GET","PUT"]"#);
    }
}
