//! Precomputed policy results.
//!
//! Tables for every literal email and every declared `(path, method)` pair
//! are built eagerly when the cache is created and never change. Scope and
//! role results for other emails are memoized on first use in a concurrent
//! map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::allowed::AllowedScopes;
use crate::method::ANY_METHOD;
use crate::pool::PolicyPool;
use crate::prefix::longest_prefix;

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the pool.
    pub misses: u64,
    /// Memoized entries added after construction.
    pub memoized: usize,
}

#[derive(Debug, Default)]
struct OriginTables {
    scopes: HashMap<String, AllowedScopes>,
    roles: HashMap<String, Vec<String>>,
    login: HashMap<String, HashMap<String, bool>>,
}

type MemoKey = (String, String);

/// Policy result cache for one [`PolicyPool`].
#[derive(Debug, Default)]
pub struct PolicyCache {
    tables: HashMap<String, OriginTables>,
    scopes_memo: DashMap<MemoKey, AllowedScopes>,
    roles_memo: DashMap<MemoKey, Vec<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PolicyCache {
    /// Build the eager tables for every origin in `pool`.
    pub fn build(pool: &PolicyPool) -> Self {
        let mut tables = HashMap::with_capacity(pool.len());

        for (origin, policy) in pool.iter() {
            let mut origin_tables = OriginTables::default();

            for email in policy.literal_rule_emails() {
                origin_tables
                    .scopes
                    .insert(email.to_string(), policy.allowed_scopes(email));
            }

            for email in policy
                .literal_rule_emails()
                .into_iter()
                .chain(policy.literal_role_emails())
            {
                origin_tables
                    .roles
                    .entry(email.to_string())
                    .or_insert_with(|| policy.allowed_roles(email));
            }

            for (path, rules) in policy.paths() {
                let flags = rules
                    .iter()
                    .flat_map(|rule| rule.methods.iter())
                    .chain(std::iter::once(ANY_METHOD))
                    .map(|method| (method.to_string(), policy.login_required(path, method)))
                    .collect();
                origin_tables.login.insert(path.clone(), flags);
            }

            tracing::debug!(
                origin,
                scopes = origin_tables.scopes.len(),
                roles = origin_tables.roles.len(),
                paths = origin_tables.login.len(),
                "Built policy cache tables"
            );
            tables.insert(origin.to_string(), origin_tables);
        }

        Self {
            tables,
            ..Self::default()
        }
    }

    /// Cached scopes for `email` on `origin`.
    pub fn allowed_scopes(&self, origin: &str, email: &str) -> Option<AllowedScopes> {
        let eager = self
            .tables
            .get(origin)
            .and_then(|tables| tables.scopes.get(email))
            .cloned();
        let found = eager.or_else(|| {
            self.scopes_memo
                .get(&memo_key(origin, email))
                .map(|entry| entry.value().clone())
        });
        self.record(found.is_some());
        found
    }

    /// Cached roles for `email` on `origin`.
    pub fn roles(&self, origin: &str, email: &str) -> Option<Vec<String>> {
        let eager = self
            .tables
            .get(origin)
            .and_then(|tables| tables.roles.get(email))
            .cloned();
        let found = eager.or_else(|| {
            self.roles_memo
                .get(&memo_key(origin, email))
                .map(|entry| entry.value().clone())
        });
        self.record(found.is_some());
        found
    }

    /// Cached login flag for `method` on `path`.
    ///
    /// Longest declared path key first, then the exact method, then `*`.
    pub fn login_required(&self, origin: &str, path: &str, method: &str) -> Option<bool> {
        let found = self.tables.get(origin).and_then(|tables| {
            let (_, flags) = longest_prefix(&tables.login, path)?;
            flags
                .get(method)
                .or_else(|| flags.get(&method.to_ascii_uppercase()))
                .or_else(|| flags.get(ANY_METHOD))
                .copied()
        });
        self.record(found.is_some());
        found
    }

    /// Memoize scopes computed on a miss.
    pub fn remember_scopes(&self, origin: &str, email: &str, scopes: AllowedScopes) {
        self.scopes_memo.insert(memo_key(origin, email), scopes);
    }

    /// Memoize roles computed on a miss.
    pub fn remember_roles(&self, origin: &str, email: &str, roles: Vec<String>) {
        self.roles_memo.insert(memo_key(origin, email), roles);
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memoized: self.scopes_memo.len() + self.roles_memo.len(),
        }
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn memo_key(origin: &str, email: &str) -> MemoKey {
    (origin.to_string(), email.to_string())
}
