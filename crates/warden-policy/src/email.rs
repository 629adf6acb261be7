//! Email patterns used in path rules and role assignments.
//!
//! A pattern is one of:
//!
//! - `-`: the anonymous sentinel, meaning "no authentication required";
//! - a literal address such as `admin@example.com`;
//! - a glob with a single `*` wildcard such as `*@example.com` or `*`.
//!
//! The sentinel is never compiled into a regular expression.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PolicyError, PolicyResult};

/// The anonymous sentinel.
pub const ANONYMOUS: &str = "-";

/// Wildcard character accepted in patterns.
pub const WILDCARD: char = '*';

#[derive(Debug, Clone)]
enum PatternKind {
    Anonymous,
    Literal,
    Glob(Regex),
}

/// A restricted glob over email addresses.
///
/// # Example
///
/// ```
/// use warden_policy::EmailPattern;
///
/// let pattern = EmailPattern::new("*@example.com").unwrap();
/// assert!(pattern.matches("a@example.com"));
/// assert!(!pattern.matches("a@example.org"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailPattern {
    raw: String,
    kind: PatternKind,
}

impl EmailPattern {
    /// Parse and compile a pattern.
    ///
    /// Rejects empty patterns and patterns with more than one `*`.
    pub fn new(raw: impl Into<String>) -> PolicyResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PolicyError::invalid_pattern(raw, "pattern is empty"));
        }
        if raw == ANONYMOUS {
            return Ok(Self {
                raw,
                kind: PatternKind::Anonymous,
            });
        }

        let kind = match raw.matches(WILDCARD).count() {
            0 => PatternKind::Literal,
            1 => PatternKind::Glob(compile_glob(&raw)?),
            _ => {
                return Err(PolicyError::invalid_pattern(
                    raw,
                    "at most one '*' wildcard is allowed",
                ))
            }
        };

        Ok(Self { raw, kind })
    }

    /// The pattern as written in the configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this is the `-` sentinel.
    pub fn is_anonymous(&self) -> bool {
        matches!(self.kind, PatternKind::Anonymous)
    }

    /// Whether this pattern contains a wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(self.kind, PatternKind::Glob(_))
    }

    /// Whether this pattern names exactly one address.
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, PatternKind::Literal)
    }

    /// Match a concrete email against this pattern.
    ///
    /// The sentinel never matches here and an empty email never matches.
    pub fn matches(&self, email: &str) -> bool {
        if email.is_empty() {
            return false;
        }
        match &self.kind {
            PatternKind::Anonymous => false,
            PatternKind::Literal => self.raw == email,
            PatternKind::Glob(regex) => regex.is_match(email),
        }
    }

    /// Whether this pattern grants access to `email`.
    ///
    /// True for the sentinel, for a literal equal to the email, and for a
    /// glob matching it.
    pub fn grants(&self, email: &str) -> bool {
        self.is_anonymous() || self.raw == email || self.matches(email)
    }
}

/// Escape everything but `*`, which becomes `.*`, then anchor.
fn compile_glob(raw: &str) -> PolicyResult<Regex> {
    let body = raw
        .split(WILDCARD)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$"))
        .map_err(|e| PolicyError::invalid_pattern(raw, e.to_string()))
}

impl PartialEq for EmailPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for EmailPattern {}

impl fmt::Display for EmailPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for EmailPattern {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for EmailPattern {
    type Error = PolicyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmailPattern> for String {
    fn from(pattern: EmailPattern) -> Self {
        pattern.raw
    }
}
