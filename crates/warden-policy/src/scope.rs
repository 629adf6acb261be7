//! Per-origin policy and the matching algorithms evaluated against it.

use std::collections::BTreeSet;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::allowed::AllowedScopes;
use crate::email::EmailPattern;
use crate::method::MethodSet;
use crate::prefix::longest_prefix;

/// One access rule at a path: who may use which methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRule {
    /// Email patterns this rule applies to.
    pub emails: Vec<EmailPattern>,
    /// Methods this rule grants.
    pub methods: MethodSet,
}

impl ScopeRule {
    /// Create a rule.
    pub fn new(emails: Vec<EmailPattern>, methods: MethodSet) -> Self {
        Self { emails, methods }
    }
}

/// Per-origin settings that are not access rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginConfig {
    /// Session token lifetime override.
    pub jwt_expiry_in: Option<Duration>,
}

/// The complete policy for one origin.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    paths: IndexMap<String, Vec<ScopeRule>>,
    roles: IndexMap<String, Vec<EmailPattern>>,
    config: OriginConfig,
}

impl OriginPolicy {
    /// Create a policy from already validated parts.
    pub fn new(
        paths: IndexMap<String, Vec<ScopeRule>>,
        roles: IndexMap<String, Vec<EmailPattern>>,
        config: OriginConfig,
    ) -> Self {
        Self {
            paths,
            roles,
            config,
        }
    }

    /// Path rules keyed by path prefix.
    pub fn paths(&self) -> &IndexMap<String, Vec<ScopeRule>> {
        &self.paths
    }

    /// Role assignments keyed by role name.
    pub fn roles(&self) -> &IndexMap<String, Vec<EmailPattern>> {
        &self.roles
    }

    /// Origin settings.
    pub fn config(&self) -> &OriginConfig {
        &self.config
    }

    /// Whether a request for `method` on `path` needs an authenticated user.
    ///
    /// Only the longest matching path key is consulted, and an unknown path
    /// needs login. Among the rules there that allow `method`, the first
    /// pattern naming a user forces login, even if another rule grants the
    /// same method anonymously.
    pub fn login_required(&self, path: &str, method: &str) -> bool {
        let Some((_, rules)) = longest_prefix(&self.paths, path) else {
            return true;
        };

        let mut anonymous_possible = false;
        for rule in rules.iter().filter(|rule| rule.methods.allows(method)) {
            for pattern in &rule.emails {
                if !pattern.is_anonymous() {
                    return true;
                }
                anonymous_possible = true;
            }
        }
        !anonymous_possible
    }

    /// Everything `email` may do on this origin.
    pub fn allowed_scopes(&self, email: &str) -> AllowedScopes {
        let mut scopes = AllowedScopes::new();
        for (path, rules) in &self.paths {
            for rule in rules {
                if rule.emails.iter().any(|pattern| pattern.grants(email)) {
                    scopes.grant(path.clone(), &rule.methods);
                }
            }
        }
        scopes
    }

    /// Roles held by `email`, sorted and de-duplicated.
    pub fn allowed_roles(&self, email: &str) -> Vec<String> {
        self.roles
            .iter()
            .filter(|(_, patterns)| patterns.iter().any(|pattern| pattern.grants(email)))
            .map(|(role, _)| role.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Literal addresses named in path rules, sorted and de-duplicated.
    pub fn literal_rule_emails(&self) -> BTreeSet<&str> {
        self.paths
            .values()
            .flatten()
            .flat_map(|rule| rule.emails.iter())
            .filter(|pattern| pattern.is_literal())
            .map(EmailPattern::as_str)
            .collect()
    }

    /// Literal addresses named in role assignments, sorted and de-duplicated.
    pub fn literal_role_emails(&self) -> BTreeSet<&str> {
        self.roles
            .values()
            .flatten()
            .filter(|pattern| pattern.is_literal())
            .map(EmailPattern::as_str)
            .collect()
    }
}
