//! The immutable access-control pool.
//!
//! [`RawPool`] is the shape read from a manifest's `acl` section.
//! [`PolicyPool::new`] validates and sanitizes it once; the result is never
//! mutated afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::email::EmailPattern;
use crate::error::{PolicyError, PolicyResult};
use crate::expiry::RawExpiry;
use crate::method::MethodSet;
use crate::scope::{OriginConfig, OriginPolicy, ScopeRule};

/// Raw access-control configuration: origin key to origin policy.
pub type RawPool = IndexMap<String, RawOriginPolicy>;

/// Raw policy for one origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawOriginPolicy {
    /// Path prefix to ordered rules.
    #[serde(default)]
    pub paths: IndexMap<String, Vec<RawScopeRule>>,
    /// Role name to email patterns.
    #[serde(default)]
    pub roles: IndexMap<String, Vec<String>>,
    /// Session token lifetime override.
    #[serde(default)]
    pub jwt_expiry_in: Option<RawExpiry>,
}

/// Raw access rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawScopeRule {
    /// Email patterns.
    #[serde(default)]
    pub emails: Vec<String>,
    /// Methods, any case.
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Sanitized policy for every configured origin.
#[derive(Debug, Clone, Default)]
pub struct PolicyPool {
    origins: IndexMap<String, OriginPolicy>,
}

impl PolicyPool {
    /// Validate and sanitize a raw pool.
    ///
    /// Origin keys are normalized to `scheme://host[:port]` without a
    /// trailing slash, methods are upper-cased and de-duplicated, and every
    /// pattern is compiled.
    pub fn new(raw: RawPool) -> PolicyResult<Self> {
        let mut origins = IndexMap::with_capacity(raw.len());
        for (key, raw_origin) in raw {
            let origin = normalize_origin(&key)?;
            let policy = build_origin_policy(raw_origin)?;
            if origins.insert(origin.clone(), policy).is_some() {
                return Err(PolicyError::duplicate_origin(origin));
            }
        }
        Ok(Self { origins })
    }

    /// Look up the policy for `origin`, ignoring a trailing slash.
    ///
    /// `None` means the origin is unknown and must be denied by default.
    pub fn match_origin(&self, origin: &str) -> Option<&OriginPolicy> {
        self.origins.get(origin.strip_suffix('/').unwrap_or(origin))
    }

    /// Iterate over `(origin, policy)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OriginPolicy)> {
        self.origins.iter().map(|(origin, policy)| (origin.as_str(), policy))
    }

    /// Number of origins.
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Whether no origin is configured.
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

fn build_origin_policy(raw: RawOriginPolicy) -> PolicyResult<OriginPolicy> {
    let mut paths = IndexMap::with_capacity(raw.paths.len());
    for (path, raw_rules) in raw.paths {
        let rules = raw_rules
            .into_iter()
            .map(|rule| {
                let emails = rule
                    .emails
                    .into_iter()
                    .map(EmailPattern::new)
                    .collect::<PolicyResult<Vec<_>>>()?;
                Ok(ScopeRule::new(emails, MethodSet::new(rule.methods)?))
            })
            .collect::<PolicyResult<Vec<_>>>()?;
        paths.insert(path, rules);
    }

    let mut roles = IndexMap::with_capacity(raw.roles.len());
    for (role, patterns) in raw.roles {
        let patterns = patterns
            .into_iter()
            .map(EmailPattern::new)
            .collect::<PolicyResult<Vec<_>>>()?;
        roles.insert(role, patterns);
    }

    let config = OriginConfig {
        jwt_expiry_in: raw.jwt_expiry_in.as_ref().map(RawExpiry::to_duration).transpose()?,
    };

    Ok(OriginPolicy::new(paths, roles, config))
}

/// Normalize a configured origin key.
///
/// Accepts `scheme://host[:port]` with an optional trailing slash; anything
/// with a path, query or fragment is rejected.
pub fn normalize_origin(raw: &str) -> PolicyResult<String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| PolicyError::invalid_origin(raw, e.to_string()))?;
    if url.host_str().is_none() {
        return Err(PolicyError::invalid_origin(raw, "missing host"));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(PolicyError::invalid_origin(
            raw,
            "origin must be scheme://host[:port] without a path",
        ));
    }
    Ok(origin_of(&url))
}

/// The `scheme://host[:port]` of a URL; default ports are omitted.
pub fn origin_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MANIFEST_ACL: &str = r#"
"http://www.example.com/":
  paths:
    "/":
      - methods: ["get"]
        emails: ["-"]
"http://docs.example.com":
  jwt_expiry_in: "3h"
  paths:
    "/":
      - methods: ["GET"]
        emails: ["*"]
      - methods: ["*"]
        emails: ["*@example.com"]
  roles:
    editor: ["*@example.com"]
"http://admin.example.com":
  jwt_expiry_in: 600
  paths:
    "/":
      - methods: ["*"]
        emails: ["admin@example.com"]
  roles:
    admin: ["admin@example.com"]
"#;

    fn pool() -> PolicyPool {
        let raw: RawPool = serde_yaml::from_str(MANIFEST_ACL).unwrap();
        PolicyPool::new(raw).unwrap()
    }

    #[test]
    fn test_origin_keys_sanitized() {
        let pool = pool();
        let origins: Vec<_> = pool.iter().map(|(origin, _)| origin).collect();
        assert_eq!(
            origins,
            vec![
                "http://www.example.com",
                "http://docs.example.com",
                "http://admin.example.com"
            ]
        );
    }

    #[test]
    fn test_match_origin_strips_trailing_slash() {
        let pool = pool();
        assert!(pool.match_origin("http://www.example.com").is_some());
        assert!(pool.match_origin("http://www.example.com/").is_some());
        assert!(pool.match_origin("https://www.example.com").is_none());
    }

    #[test]
    fn test_methods_normalized() {
        let pool = pool();
        let policy = pool.match_origin("http://www.example.com").unwrap();
        let rule = &policy.paths()["/"][0];
        assert_eq!(rule.methods.iter().collect::<Vec<_>>(), vec!["GET"]);
    }

    #[test]
    fn test_expiry_parsed() {
        let pool = pool();
        let docs = pool.match_origin("http://docs.example.com").unwrap();
        assert_eq!(docs.config().jwt_expiry_in, Some(std::time::Duration::from_secs(10_800)));
        let admin = pool.match_origin("http://admin.example.com").unwrap();
        assert_eq!(admin.config().jwt_expiry_in, Some(std::time::Duration::from_secs(600)));
        let www = pool.match_origin("http://www.example.com").unwrap();
        assert_eq!(www.config().jwt_expiry_in, None);
    }

    #[test]
    fn test_duplicate_origin_rejected() {
        let raw: RawPool = serde_yaml::from_str(
            r#"
"http://a.example.com": {}
"http://a.example.com/": {}
"#,
        )
        .unwrap();
        assert!(matches!(
            PolicyPool::new(raw),
            Err(PolicyError::DuplicateOrigin { .. })
        ));
    }

    #[test]
    fn test_origin_with_path_rejected() {
        assert!(normalize_origin("http://a.example.com/app").is_err());
        assert!(normalize_origin("not a url").is_err());
    }

    #[test]
    fn test_origin_normalization() {
        assert_eq!(normalize_origin("HTTP://Example.COM/").unwrap(), "http://example.com");
        assert_eq!(normalize_origin("https://example.com:443").unwrap(), "https://example.com");
        assert_eq!(normalize_origin("http://localhost:8080").unwrap(), "http://localhost:8080");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let raw: RawPool = serde_yaml::from_str(
            r#"
"http://a.example.com":
  paths:
    "/":
      - methods: ["GET"]
        emails: ["*@*.example.com"]
"#,
        )
        .unwrap();
        assert!(matches!(
            PolicyPool::new(raw),
            Err(PolicyError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let raw: Result<RawPool, _> = serde_yaml::from_str(
            r#"
"http://a.example.com":
  pathz: {}
"#,
        );
        assert!(raw.is_err());
    }

    proptest! {
        #[test]
        fn prop_origin_keys_never_end_in_slash(
            host in "[a-z]{1,12}",
            slashes in 0usize..3,
        ) {
            let key = format!("http://{host}.example.com{}", "/".repeat(slashes.min(1)));
            let mut raw = RawPool::new();
            raw.insert(key, RawOriginPolicy::default());
            let pool = PolicyPool::new(raw).unwrap();
            for (origin, _) in pool.iter() {
                prop_assert!(!origin.ends_with('/'));
            }
        }

        #[test]
        fn prop_methods_canonical(methods in proptest::collection::vec("[a-zA-Z]{1,7}", 1..8)) {
            let mut raw_origin = RawOriginPolicy::default();
            raw_origin.paths.insert(
                "/".into(),
                vec![RawScopeRule { emails: vec!["-".into()], methods: methods.clone() }],
            );
            let mut raw = RawPool::new();
            raw.insert("http://example.com".into(), raw_origin);

            let pool = PolicyPool::new(raw).unwrap();
            let policy = pool.match_origin("http://example.com").unwrap();
            let set: Vec<&str> = policy.paths()["/"][0].methods.iter().collect();

            for method in &set {
                prop_assert_eq!(method.to_ascii_uppercase(), *method);
            }
            let mut deduped = set.clone();
            deduped.sort_unstable();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), set.len());
        }
    }
}
