//! OAuth2 identity providers.
//!
//! Each provider knows its authorization URL, how to exchange an
//! authorization code for an access token, and how to turn that token into
//! an [`Identity`]. [`ProviderRegistry`] is built once at startup from the
//! client specs on the command line and handed to the login handlers.

pub mod github;
pub mod google;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

pub use github::GithubProvider;
pub use google::GoogleProvider;

/// Who logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Verified email address.
    pub email: String,
    /// Provider-specific extras carried into the session, e.g. `username`.
    pub extras: BTreeMap<String, String>,
}

impl Identity {
    /// Create an identity without extras.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            extras: BTreeMap::new(),
        }
    }

    /// Add an extra.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// An OAuth2 login provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registry name, used in `/.auth/{name}/...` paths.
    fn name(&self) -> &str;

    /// Where to send the user to authorize.
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String;

    /// Exchange an authorization code for an access token.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> GatewayResult<String>;

    /// Look up the user behind an access token.
    async fn fetch_identity(&self, access_token: &str) -> GatewayResult<Identity>;
}

/// Client credentials registered with a provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    /// OAuth2 client ID.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Parse a `Name;ClientID;ClientSecret` spec.
pub fn parse_client_spec(spec: &str) -> GatewayResult<(String, ClientCredentials)> {
    let parts: Vec<&str> = spec.split(';').map(str::trim).collect();
    match parts.as_slice() {
        [name, id, secret] if !name.is_empty() && !id.is_empty() && !secret.is_empty() => Ok((
            name.to_ascii_lowercase(),
            ClientCredentials {
                client_id: (*id).to_string(),
                client_secret: (*secret).to_string(),
            },
        )),
        _ => Err(GatewayError::config(
            "OAuth2 client must be given as Name;ClientID;ClientSecret",
        )),
    }
}

/// Token endpoint response shared by the supported providers.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_access_token(self, provider: &str) -> GatewayResult<String> {
        match (self.access_token, self.error) {
            (Some(token), None) if !token.is_empty() => Ok(token),
            (_, Some(error)) => Err(GatewayError::oauth2(
                provider,
                format!(
                    "token exchange rejected: {error} {}",
                    self.error_description.unwrap_or_default()
                )
                .trim_end()
                .to_string(),
            )),
            _ => Err(GatewayError::oauth2(provider, "token response had no access_token")),
        }
    }
}

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// The configured login providers, keyed by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn IdentityProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from `Name;ClientID;ClientSecret` specs.
    ///
    /// Unknown provider names, malformed specs and duplicates are
    /// configuration errors.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> GatewayResult<Self> {
        let mut registry = Self::new();
        for spec in specs {
            let (name, credentials) = parse_client_spec(spec.as_ref())?;
            let provider: Arc<dyn IdentityProvider> = match name.as_str() {
                "github" => Arc::new(GithubProvider::new(credentials)),
                "google" => Arc::new(GoogleProvider::new(credentials)),
                other => {
                    return Err(GatewayError::config(format!(
                        "unsupported OAuth2 provider: {other}"
                    )))
                }
            };
            registry = registry.with_provider(provider)?;
        }
        Ok(registry)
    }

    /// Add a provider.
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> GatewayResult<Self> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(GatewayError::config(format!(
                "OAuth2 provider configured twice: {name}"
            )));
        }
        self.providers.insert(name, provider);
        Ok(self)
    }

    /// Look up a provider.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn IdentityProvider>> {
        self.providers.get(name)
    }

    /// Provider names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is configured.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
