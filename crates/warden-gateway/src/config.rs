//! Configuration for the Warden gateway.
//!
//! Settings come from an optional TOML or JSON file, then command-line flags
//! and `WARDEN_*` environment variables (see [`crate::cli`]). The proxy
//! routes and access-control list live in the separate manifest.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::logging::LogFormat;

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and proxy settings.
    pub server: ServerSettings,
    /// Session signing and login providers.
    pub auth: AuthSettings,
    /// Manifest location and reload.
    pub manifest: ManifestSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl GatewayConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load configuration from a TOML or JSON file.
    pub fn from_file(path: impl Into<PathBuf>) -> GatewayResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GatewayError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| GatewayError::config(format!("invalid JSON: {e}"))),
            _ => Err(GatewayError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(GatewayError::config("jwt_secret is required"));
        }

        if self.auth.oauth2_clients.is_empty() {
            return Err(GatewayError::config(
                "at least one OAuth2 client is required",
            ));
        }

        if self.manifest.path.is_none() {
            return Err(GatewayError::config("manifest path is required"));
        }

        if self.server.upstream_timeout.is_zero() {
            return Err(GatewayError::config("upstream_timeout must be positive"));
        }

        if self.server.default_token_ttl.is_zero() {
            return Err(GatewayError::config("default_token_ttl must be positive"));
        }

        self.socket_addr()?;
        Ok(())
    }

    /// The address to bind.
    pub fn socket_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.server.listen_addr, self.server.port)
            .parse()
            .map_err(|e| {
                GatewayError::config(format!(
                    "invalid listen address {}:{}: {e}",
                    self.server.listen_addr, self.server.port
                ))
            })
    }

    /// Whether cookies carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.server.secure_cookie || self.server.behind_tls
    }
}

/// Listener and proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind to.
    pub listen_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// TLS is terminated in front of the gateway.
    pub behind_tls: bool,
    /// Mark cookies `Secure`.
    pub secure_cookie: bool,
    /// Timeout for upstream requests.
    #[serde(with = "duration_serde")]
    pub upstream_timeout: Duration,
    /// Token lifetime when the origin sets none.
    #[serde(with = "duration_serde")]
    pub default_token_ttl: Duration,
    /// Grace period for in-flight connections on shutdown.
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: 8080,
            behind_tls: false,
            secure_cookie: false,
            upstream_timeout: Duration::from_secs(30),
            default_token_ttl: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Session signing and login providers.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HMAC key for session tokens.
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    /// Client specs in `Name;ClientID;ClientSecret` form.
    #[serde(skip_serializing)]
    pub oauth2_clients: Vec<String>,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("oauth2_clients", &self.oauth2_clients.len())
            .finish()
    }
}

/// Manifest location and reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSettings {
    /// Path to the manifest file.
    pub path: Option<PathBuf>,
    /// Reload the manifest when it changes.
    pub watch: bool,
    /// Debounce window for file changes.
    #[serde(with = "duration_serde")]
    pub debounce: Duration,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            path: None,
            watch: false,
            debounce: Duration::from_millis(500),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log at debug level.
    pub debug: bool,
    /// Output format.
    pub format: LogFormat,
}

/// Builder for `GatewayConfig`.
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Start from an existing configuration.
    pub fn from_config(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Set the listen port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.listen_addr = addr.into();
        self
    }

    /// Set the session signing key.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = secret.into();
        self
    }

    /// Add an OAuth2 client spec.
    #[must_use]
    pub fn oauth2_client(mut self, spec: impl Into<String>) -> Self {
        self.config.auth.oauth2_clients.push(spec.into());
        self
    }

    /// Set the manifest path.
    #[must_use]
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.manifest.path = Some(path.into());
        self
    }

    /// Enable manifest hot reload.
    #[must_use]
    pub fn watch(mut self, watch: bool) -> Self {
        self.config.manifest.watch = watch;
        self
    }

    /// Mark cookies `Secure`.
    #[must_use]
    pub fn secure_cookie(mut self, secure: bool) -> Self {
        self.config.server.secure_cookie = secure;
        self
    }

    /// Declare TLS terminated in front of the gateway.
    #[must_use]
    pub fn behind_tls(mut self, behind_tls: bool) -> Self {
        self.config.server.behind_tls = behind_tls;
        self
    }

    /// Set the upstream timeout.
    #[must_use]
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.upstream_timeout = timeout;
        self
    }

    /// Set the default token lifetime.
    #[must_use]
    pub fn default_token_ttl(mut self, ttl: Duration) -> Self {
        self.config.server.default_token_ttl = ttl;
        self
    }

    /// Log at debug level.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.logging.debug = debug;
        self
    }

    /// Set the log format.
    #[must_use]
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GatewayResult<GatewayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Durations as `30s`, `1h30m`, `250ms` or bare seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        };
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        warden_policy::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> GatewayConfigBuilder {
        GatewayConfig::builder()
            .jwt_secret("s3cret")
            .oauth2_client("github;id;secret")
            .manifest("/etc/warden/manifest.yaml")
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.listen_addr, "0.0.0.0");
        assert_eq!(config.server.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.server.default_token_ttl, Duration::from_secs(3600));
        assert!(!config.manifest.watch);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_config_builder() {
        let config = valid()
            .port(9000)
            .listen_addr("127.0.0.1")
            .upstream_timeout(Duration::from_secs(5))
            .watch(true)
            .build()
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.upstream_timeout, Duration::from_secs(5));
        assert!(config.manifest.watch);
    }

    #[test]
    fn test_config_validation() {
        assert!(GatewayConfig::builder().build().is_err());
        assert!(valid().jwt_secret("").build().is_err());
        assert!(valid().listen_addr("not an address").build().is_err());
        assert!(valid().upstream_timeout(Duration::ZERO).build().is_err());

        let no_clients = GatewayConfig::builder()
            .jwt_secret("s3cret")
            .manifest("/etc/warden/manifest.yaml")
            .build();
        assert!(no_clients.is_err());

        assert!(valid().build().is_ok());
    }

    #[test]
    fn test_secure_cookies() {
        assert!(!valid().build().unwrap().secure_cookies());
        assert!(valid().secure_cookie(true).build().unwrap().secure_cookies());
        assert!(valid().behind_tls(true).build().unwrap().secure_cookies());
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
[server]
port = 8443
behind_tls = true
upstream_timeout = "1m30s"

[auth]
jwt_secret = "s3cret"
oauth2_clients = ["google;id;secret"]

[manifest]
path = "/etc/warden/manifest.yaml"
watch = true

[logging]
format = "pretty"
"#;
        let config: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.server.upstream_timeout, Duration::from_secs(90));
        assert_eq!(config.server.default_token_ttl, Duration::from_secs(3600));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secrets_not_serialized() {
        let config = valid().build().unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn test_from_file_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(GatewayConfig::from_file(file.path()).is_err());
    }
}
