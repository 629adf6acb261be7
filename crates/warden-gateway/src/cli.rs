//! Command-line interface.
//!
//! Every flag can also come from a `WARDEN_*` environment variable. Flags
//! override values from `--config`, which override built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{GatewayConfig, GatewayConfigBuilder};
use crate::error::GatewayResult;
use crate::logging::LogFormat;

fn parse_duration(raw: &str) -> Result<Duration, String> {
    warden_policy::parse_duration(raw).map_err(|e| e.to_string())
}

/// Authenticating reverse proxy.
#[derive(Debug, Parser)]
#[command(name = "warden", version, about)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long, env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short = 'p', long, env = "WARDEN_PORT")]
    pub port: Option<u16>,

    /// Address to bind to
    #[arg(long, env = "WARDEN_LISTEN_ADDR")]
    pub listen_addr: Option<String>,

    /// Secret used to sign session tokens
    #[arg(long, env = "WARDEN_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// OAuth2 client as `Name;ClientID;ClientSecret` (repeatable)
    #[arg(
        long = "oauth2-client",
        env = "WARDEN_OAUTH2_CLIENTS",
        value_delimiter = ',',
        hide_env_values = true
    )]
    pub oauth2_clients: Vec<String>,

    /// Proxy and access-control manifest (YAML)
    #[arg(short = 'f', long, env = "WARDEN_MANIFEST")]
    pub manifest: Option<PathBuf>,

    /// Reload the manifest when it changes
    #[arg(long, env = "WARDEN_WATCH")]
    pub watch: bool,

    /// Mark cookies `Secure`
    #[arg(long, env = "WARDEN_SECURE_COOKIE")]
    pub secure_cookie: bool,

    /// TLS is terminated in front of the gateway
    #[arg(long, env = "WARDEN_BEHIND_TLS")]
    pub behind_tls: bool,

    /// Upstream request timeout, e.g. `30s` or `2m`
    #[arg(long, env = "WARDEN_UPSTREAM_TIMEOUT", value_parser = parse_duration)]
    pub upstream_timeout: Option<Duration>,

    /// Log at debug level
    #[arg(short = 'd', long, env = "WARDEN_DEBUG")]
    pub debug: bool,

    /// Log output format
    #[arg(long, env = "WARDEN_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Merge the flags over the config file, if any, and validate.
    ///
    /// Boolean flags can only switch a setting on.
    pub fn into_config(self) -> GatewayResult<GatewayConfig> {
        let base = match &self.config {
            Some(path) => GatewayConfig::from_file(path)?,
            None => GatewayConfig::default(),
        };
        let mut builder = GatewayConfigBuilder::from_config(base);

        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(addr) = self.listen_addr {
            builder = builder.listen_addr(addr);
        }
        if let Some(secret) = self.jwt_secret {
            builder = builder.jwt_secret(secret);
        }
        for spec in self.oauth2_clients {
            builder = builder.oauth2_client(spec);
        }
        if let Some(path) = self.manifest {
            builder = builder.manifest(path);
        }
        if self.watch {
            builder = builder.watch(true);
        }
        if self.secure_cookie {
            builder = builder.secure_cookie(true);
        }
        if self.behind_tls {
            builder = builder.behind_tls(true);
        }
        if let Some(timeout) = self.upstream_timeout {
            builder = builder.upstream_timeout(timeout);
        }
        if self.debug {
            builder = builder.debug(true);
        }
        if let Some(format) = self.log_format {
            builder = builder.log_format(format);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("warden").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_minimal_flags() {
        let config = parse(&[
            "--jwt-secret",
            "s3cret",
            "--oauth2-client",
            "github;id;secret",
            "-f",
            "manifest.yaml",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.oauth2_clients, vec!["github;id;secret"]);
        assert_eq!(config.manifest.path, Some(PathBuf::from("manifest.yaml")));
        assert!(!config.manifest.watch);
        config.validate().unwrap();
    }

    #[test]
    fn test_repeated_and_delimited_clients() {
        let cli = parse(&[
            "--oauth2-client",
            "github;a;b,google;c;d",
            "--oauth2-client",
            "other;e;f",
        ]);
        assert_eq!(cli.oauth2_clients, vec!["github;a;b", "google;c;d", "other;e;f"]);
    }

    #[test]
    fn test_all_flags() {
        let config = parse(&[
            "-p",
            "9000",
            "--listen-addr",
            "127.0.0.1",
            "--jwt-secret",
            "x",
            "--oauth2-client",
            "google;a;b",
            "--manifest",
            "m.yaml",
            "--watch",
            "--secure-cookie",
            "--behind-tls",
            "--upstream-timeout",
            "5s",
            "--debug",
            "--log-format",
            "pretty",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert!(config.manifest.watch);
        assert!(config.server.secure_cookie);
        assert!(config.server.behind_tls);
        assert!(config.secure_cookies());
        assert_eq!(config.server.upstream_timeout, Duration::from_secs(5));
        assert!(config.logging.debug);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let result = Cli::try_parse_from(["warden", "--upstream-timeout", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 7000\nupstream_timeout = \"10s\"\n\n\
             [auth]\njwt_secret = \"from-file\"\noauth2_clients = [\"github;id;secret\"]\n\n\
             [manifest]\npath = \"manifest.yaml\"\n"
        )
        .unwrap();

        let config = parse(&[
            "--config",
            file.path().to_str().unwrap(),
            "--port",
            "7001",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.server.port, 7001);
        assert_eq!(config.server.upstream_timeout, Duration::from_secs(10));
        assert_eq!(config.auth.jwt_secret, "from-file");
    }
}
