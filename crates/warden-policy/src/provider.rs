//! The policy facade addressed by request URL.

use chrono::{DateTime, Utc};
use url::Url;

use crate::allowed::AllowedScopes;
use crate::cache::{CacheStats, PolicyCache};
use crate::pool::{origin_of, PolicyPool};
use crate::scope::OriginConfig;

/// Answers policy questions for a request URL.
///
/// An origin missing from the policy is denied by default: login is
/// required, and scopes and roles are empty.
pub trait PolicyProvider: Send + Sync {
    /// Whether `method` on `url` needs an authenticated user.
    fn login_required(&self, url: &Url, method: &str) -> bool;

    /// Everything `email` may do on the origin of `url`.
    fn allowed_scopes(&self, url: &Url, email: &str) -> AllowedScopes;

    /// Roles held by `email` on the origin of `url`.
    fn roles(&self, url: &Url, email: &str) -> Vec<String>;

    /// Settings for the origin of `url`.
    fn origin_config(&self, url: &Url) -> Option<OriginConfig>;

    /// When this provider was built.
    ///
    /// Tokens issued earlier carry scopes computed from an older policy.
    fn loaded_at(&self) -> DateTime<Utc>;
}

/// [`PolicyProvider`] over a [`PolicyPool`] and its [`PolicyCache`].
#[derive(Debug)]
pub struct PolicyEngine {
    pool: PolicyPool,
    cache: PolicyCache,
    loaded_at: DateTime<Utc>,
}

impl PolicyEngine {
    /// Build an engine, precomputing the cache.
    pub fn new(pool: PolicyPool) -> Self {
        let cache = PolicyCache::build(&pool);
        Self {
            pool,
            cache,
            loaded_at: Utc::now(),
        }
    }

    /// Override the load timestamp.
    #[must_use]
    pub fn with_loaded_at(mut self, loaded_at: DateTime<Utc>) -> Self {
        self.loaded_at = loaded_at;
        self
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PolicyPool {
        &self.pool
    }

    /// Cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl PolicyProvider for PolicyEngine {
    fn login_required(&self, url: &Url, method: &str) -> bool {
        let origin = origin_of(url);
        let path = url.path();

        if let Some(required) = self.cache.login_required(&origin, path, method) {
            return required;
        }
        match self.pool.match_origin(&origin) {
            Some(policy) => policy.login_required(path, method),
            None => {
                tracing::debug!(origin = %origin, "Unknown origin, login required");
                true
            }
        }
    }

    fn allowed_scopes(&self, url: &Url, email: &str) -> AllowedScopes {
        let origin = origin_of(url);
        if let Some(scopes) = self.cache.allowed_scopes(&origin, email) {
            return scopes;
        }
        let Some(policy) = self.pool.match_origin(&origin) else {
            tracing::debug!(origin = %origin, "Unknown origin, no scopes");
            return AllowedScopes::new();
        };
        let scopes = policy.allowed_scopes(email);
        self.cache.remember_scopes(&origin, email, scopes.clone());
        scopes
    }

    fn roles(&self, url: &Url, email: &str) -> Vec<String> {
        let origin = origin_of(url);
        if let Some(roles) = self.cache.roles(&origin, email) {
            return roles;
        }
        let Some(policy) = self.pool.match_origin(&origin) else {
            return Vec::new();
        };
        let roles = policy.allowed_roles(email);
        self.cache.remember_roles(&origin, email, roles.clone());
        roles
    }

    fn origin_config(&self, url: &Url) -> Option<OriginConfig> {
        self.pool
            .match_origin(&origin_of(url))
            .map(|policy| *policy.config())
    }

    fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::RawPool;
    use std::time::Duration;

    fn engine() -> PolicyEngine {
        let raw: RawPool = serde_yaml::from_str(
            r#"
"http://www.example.com":
  paths:
    "/":
      - methods: ["GET"]
        emails: ["-"]
"https://docs.example.com":
  jwt_expiry_in: "3h"
  paths:
    "/":
      - methods: ["GET"]
        emails: ["*"]
      - methods: ["*"]
        emails: ["*@example.com"]
  roles:
    editor: ["*@example.com"]
"#,
        )
        .unwrap();
        PolicyEngine::new(PolicyPool::new(raw).unwrap())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_public_site() {
        let engine = engine();
        assert!(!engine.login_required(&url("http://www.example.com/docs?q=1"), "GET"));
        assert!(engine.login_required(&url("http://www.example.com/docs"), "POST"));
    }

    #[test]
    fn test_unknown_origin_denied() {
        let engine = engine();
        let unknown = url("http://evil.example.net/");
        assert!(engine.login_required(&unknown, "GET"));
        assert!(engine.allowed_scopes(&unknown, "a@example.com").is_empty());
        assert!(engine.roles(&unknown, "a@example.com").is_empty());
        assert!(engine.origin_config(&unknown).is_none());
    }

    #[test]
    fn test_scheme_is_part_of_origin() {
        let engine = engine();
        assert!(engine.login_required(&url("https://www.example.com/"), "GET"));
    }

    #[test]
    fn test_wildcard_scopes_memoized() {
        let engine = engine();
        let docs = url("https://docs.example.com/guide");

        let first = engine.allowed_scopes(&docs, "writer@example.com");
        assert!(first.matches("/guide", "PUT"));
        let second = engine.allowed_scopes(&docs, "writer@example.com");
        assert_eq!(first, second);

        let stats = engine.cache_stats();
        assert_eq!(stats.memoized, 1);
        assert!(stats.hits >= 1);

        let outsider = engine.allowed_scopes(&docs, "reader@gmail.com");
        assert!(outsider.matches("/guide", "GET"));
        assert!(!outsider.matches("/guide", "PUT"));
    }

    #[test]
    fn test_roles_and_config() {
        let engine = engine();
        let docs = url("https://docs.example.com/");
        assert_eq!(engine.roles(&docs, "writer@example.com"), vec!["editor"]);
        assert!(engine.roles(&docs, "reader@gmail.com").is_empty());
        assert_eq!(
            engine.origin_config(&docs).and_then(|c| c.jwt_expiry_in),
            Some(Duration::from_secs(10_800))
        );
    }

    #[test]
    fn test_loaded_at_override() {
        let at = Utc::now() - chrono::Duration::hours(1);
        let engine = engine().with_loaded_at(at);
        assert_eq!(engine.loaded_at(), at);
    }
}
