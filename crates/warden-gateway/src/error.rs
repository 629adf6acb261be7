//! Error types for the Warden gateway.

use thiserror::Error;
use warden_config::ConfigError;
use warden_session::SessionError;

/// Gateway-specific errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// The manifest could not be loaded.
    #[error("Manifest error: {0}")]
    Manifest(#[from] ConfigError),

    /// Upstream connection error.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Error message.
        message: String,
    },

    /// No proxy route matches the request URL.
    #[error("No route for {url}")]
    RouteNotFound {
        /// The request URL.
        url: String,
    },

    /// Session token error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// OAuth2 provider error.
    #[error("OAuth2 error ({provider}): {message}")]
    OAuth2 {
        /// Provider name.
        provider: String,
        /// Error message.
        message: String,
    },

    /// Server startup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl GatewayError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a route-not-found error.
    pub fn route_not_found(url: impl Into<String>) -> Self {
        Self::RouteNotFound { url: url.into() }
    }

    /// Create an OAuth2 error.
    pub fn oauth2(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OAuth2 {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config { .. } => 500,
            Self::Manifest(_) => 500,
            Self::Upstream { .. } => 502,
            Self::RouteNotFound { .. } => 404,
            Self::Session(e) if e.requires_login() => 401,
            Self::Session(_) => 500,
            Self::OAuth2 { .. } => 502,
            Self::Server { .. } => 500,
            Self::Io(_) => 500,
            Self::Http(_) => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// Get the error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Manifest(_) => "manifest",
            Self::Upstream { .. } => "upstream",
            Self::RouteNotFound { .. } => "route",
            Self::Session(_) => "session",
            Self::OAuth2 { .. } => "oauth2",
            Self::Server { .. } => "server",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
