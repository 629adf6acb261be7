//! Warden Gateway - Authenticating Reverse Proxy
//!
//! The gateway sits in front of internal web applications. It signs users in
//! with an OAuth2 provider, keeps their identity and grants in a signed
//! session token, and forwards only the requests the access-control manifest
//! allows.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                Warden Gateway                │
//!                    │                                              │
//!   browser ────────►│  /healthz ──► HealthChecker                  │
//!                    │  /.auth/* ──► LoginHandler ──► GitHub/Google │
//!                    │  other    ──► AuthorizationPipeline          │
//!                    │                 │  PolicyProvider            │
//!                    │                 │  TokenCodec                │
//!                    │                 ▼                            │
//!                    │             ProxyRouter ──► ProxyClient ─────┼──► backend
//!                    │                                              │
//!                    │  manifest.yaml ──(watch)──► SnapshotHandle   │
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! # Example Usage
//!
//! ```bash
//! $ warden --jwt-secret "$SECRET" \
//!     --oauth2-client "github;$CLIENT_ID;$CLIENT_SECRET" \
//!     -f /etc/warden/manifest.yaml --watch
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod cookie;
pub mod error;
pub mod health;
pub mod logging;
pub mod login;
pub mod oauth2;
pub mod pipeline;
pub mod reload;
pub mod request_url;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod upstream;

pub use cli::Cli;
pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use cookie::{CookieController, DefaultCookieController};
pub use error::{GatewayError, GatewayResult};
pub use health::{HealthChecker, HealthResponse, HealthStatus};
pub use logging::{init_logging, LogFormat};
pub use login::LoginHandler;
pub use oauth2::{Identity, IdentityProvider, ProviderRegistry};
pub use pipeline::{AuthorizationPipeline, PipelineOutcome, PipelineState, RequestMeta};
pub use reload::{reload_manifest, watch_manifest, Snapshot, SnapshotHandle};
pub use router::{ProxyRouter, ProxyTarget};
pub use server::{GatewayServer, GatewayState};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
pub use upstream::{ProxyClient, Upstream, UpstreamRequest, UpstreamResponse};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
