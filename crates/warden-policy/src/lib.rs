//! Warden Policy - Origin-scoped Access Control
//!
//! This crate holds the access-control model of the Warden gateway: which
//! user may call which HTTP method on which path of which origin.
//!
//! # Overview
//!
//! - [`EmailPattern`] matches addresses against a restricted glob (`*`) or
//!   the anonymous sentinel `-`
//! - [`PolicyPool`] is the sanitized, immutable policy for every origin
//! - [`PolicyCache`] precomputes results for literal addresses and declared
//!   paths, and memoizes the rest
//! - [`PolicyEngine`] answers [`PolicyProvider`] queries by request URL
//!
//! # Architecture
//!
//! ```text
//!     manifest `acl`
//!          │ serde
//!     ┌────▼──────┐   sanitize   ┌────────────┐
//!     │  RawPool  │─────────────▶│ PolicyPool │
//!     └───────────┘              └─────┬──────┘
//!                                      │ build
//!                               ┌──────▼──────┐
//!      request URL ────────────▶│ PolicyEngine│──▶ login / scopes / roles
//!                               │ + PolicyCache│
//!                               └─────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use warden_policy::{PolicyEngine, PolicyPool, PolicyProvider, RawPool};
//!
//! let raw: RawPool = serde_yaml::from_str(acl_yaml)?;
//! let engine = PolicyEngine::new(PolicyPool::new(raw)?);
//!
//! let url = url::Url::parse("http://www.example.com/admin")?;
//! if engine.login_required(&url, "GET") {
//!     // redirect to the login page
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allowed;
pub mod cache;
pub mod email;
pub mod error;
pub mod expiry;
pub mod method;
pub mod pool;
pub mod prefix;
pub mod provider;
pub mod scope;

pub use allowed::AllowedScopes;
pub use cache::{CacheStats, PolicyCache};
pub use email::{EmailPattern, ANONYMOUS};
pub use error::{PolicyError, PolicyResult};
pub use expiry::{parse_duration, RawExpiry};
pub use method::{MethodSet, ANY_METHOD};
pub use pool::{normalize_origin, origin_of, PolicyPool, RawOriginPolicy, RawPool, RawScopeRule};
pub use prefix::longest_prefix;
pub use provider::{PolicyEngine, PolicyProvider};
pub use scope::{OriginConfig, OriginPolicy, ScopeRule};
