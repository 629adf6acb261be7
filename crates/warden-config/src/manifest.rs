//! The gateway manifest: proxy routes plus the access-control list.
//!
//! A manifest is read from YAML (`.yaml`, `.yml`), JSON or TOML, chosen by
//! file extension:
//!
//! ```yaml
//! proxies:
//!   - external_url: "http://www.example.com/"
//!     target: "http://www:80/"
//!     set_headers:
//!       Remote-User: ["warden"]
//! acl:
//!   "http://www.example.com":
//!     paths:
//!       "/":
//!         - methods: ["GET"]
//!           emails: ["-"]
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;
use warden_policy::{PolicyPool, RawPool};

use crate::error::{ConfigError, ConfigResult};

/// One proxied site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyRoute {
    /// External URL prefix, e.g. `https://www.example.com/`.
    pub external_url: String,
    /// Backend URL requests are forwarded to.
    pub target: String,
    /// Headers set on every forwarded request, replacing client values.
    #[serde(default)]
    pub set_headers: IndexMap<String, Vec<String>>,
}

impl ProxyRoute {
    /// Create a route without extra headers.
    pub fn new(external_url: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            external_url: external_url.into(),
            target: target.into(),
            set_headers: IndexMap::new(),
        }
    }

    /// Add a header value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }
}

/// The whole manifest file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Proxy routes.
    #[serde(default)]
    pub proxies: Vec<ProxyRoute>,
    /// Access control keyed by origin.
    #[serde(default)]
    pub acl: RawPool,
}

impl Manifest {
    /// Load and validate a manifest file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let manifest = match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            Some("toml") => Self::from_toml_str(&content)?,
            _ => return Err(ConfigError::UnsupportedFormat { path: path.into() }),
        };

        tracing::debug!(
            path = %path.display(),
            proxies = manifest.proxies.len(),
            origins = manifest.acl.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Parse and validate YAML.
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let manifest: Self = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate JSON.
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let manifest: Self = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate TOML.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the proxy routes.
    ///
    /// External and target URLs must be absolute `http`/`https` URLs with a
    /// host, and each external URL may appear only once.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::with_capacity(self.proxies.len());
        for (i, route) in self.proxies.iter().enumerate() {
            validate_url(&format!("proxies[{i}].external_url"), &route.external_url)?;
            validate_url(&format!("proxies[{i}].target"), &route.target)?;
            if !seen.insert(route.external_url.trim()) {
                return Err(ConfigError::invalid_value(
                    format!("proxies[{i}].external_url"),
                    format!("duplicate external URL {}", route.external_url),
                ));
            }
        }
        Ok(())
    }

    /// Build the sanitized policy pool from the `acl` section.
    pub fn policy_pool(&self) -> ConfigResult<PolicyPool> {
        Ok(PolicyPool::new(self.acl.clone())?)
    }
}

fn validate_url(field: &str, value: &str) -> ConfigResult<()> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::invalid_value(field, format!("{value:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid_value(
            field,
            format!("{value:?}: scheme must be http or https"),
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::invalid_value(field, format!("{value:?}: missing host")));
    }
    Ok(())
}
