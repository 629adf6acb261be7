//! Structured logging setup.
//!
//! `RUST_LOG` wins when set. Otherwise the Warden crates log at `info`, or
//! `debug` with `--debug`, and everything else at `warn`.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_gateway::logging::{init_logging, LogFormat};
//!
//! init_logging(false, LogFormat::Pretty)?;
//! tracing::info!(port = 8080, "Listening");
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{GatewayError, GatewayResult};

const WARDEN_TARGETS: [&str; 5] = [
    "warden",
    "warden_gateway",
    "warden_policy",
    "warden_session",
    "warden_config",
];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, multi-line.
    Pretty,
}

/// The default filter directive string.
pub fn default_directives(debug: bool) -> String {
    let level = if debug { "debug" } else { "info" };
    let mut directives: Vec<String> = WARDEN_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// Build the filter: `RUST_LOG` if set, else the defaults.
pub fn env_filter(debug: bool) -> GatewayResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directives(debug))
            .map_err(|e| GatewayError::config(format!("invalid log filter: {e}"))),
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(debug: bool, format: LogFormat) -> GatewayResult<()> {
    let filter = env_filter(debug)?;

    match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| GatewayError::config(format!("logging init failed: {e}")))?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_filter(filter);

            tracing_subscriber::registry()
                .with(fmt_layer)
                .try_init()
                .map_err(|e| GatewayError::config(format!("logging init failed: {e}")))?;
        }
    }

    Ok(())
}
