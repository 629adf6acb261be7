//! HTTP front end.
//!
//! Accepts connections with hyper, buffers each request body, and routes:
//!
//! - `/healthz` to the health checker
//! - `/.auth/*` to the login handler
//! - everything else through the [`AuthorizationPipeline`]
//!
//! Every request runs inside a `request` span carrying its request ID, and
//! ends with one access log line.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;
use uuid::Uuid;
use warden_session::TokenCodec;

use crate::config::GatewayConfig;
use crate::cookie::DefaultCookieController;
use crate::error::{GatewayError, GatewayResult};
use crate::health::HealthChecker;
use crate::login::{AuthRoute, LoginHandler};
use crate::oauth2::ProviderRegistry;
use crate::pipeline::{status_response, AuthorizationPipeline, RequestMeta};
use crate::reload::{Snapshot, SnapshotHandle};
use crate::request_url::request_url;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::upstream::{ProxyClient, HEADER_REQUEST_ID};

/// Liveness endpoint.
pub const HEALTH_PATH: &str = "/healthz";

/// Everything a request needs, shared across connections.
#[derive(Debug)]
pub struct GatewayState {
    pipeline: AuthorizationPipeline,
    login: LoginHandler,
    snapshots: Arc<SnapshotHandle>,
    health: Arc<HealthChecker>,
}

impl GatewayState {
    /// Assemble the shared state.
    pub fn new(
        pipeline: AuthorizationPipeline,
        login: LoginHandler,
        snapshots: Arc<SnapshotHandle>,
        health: Arc<HealthChecker>,
    ) -> Self {
        Self {
            pipeline,
            login,
            snapshots,
            health,
        }
    }

    /// The serving snapshot handle.
    pub fn snapshots(&self) -> &Arc<SnapshotHandle> {
        &self.snapshots
    }

    /// The health checker.
    pub fn health(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    /// Handle one buffered request.
    pub async fn handle(&self, request: Request<Bytes>, peer: Option<SocketAddr>) -> Response<Bytes> {
        let started = Instant::now();
        let request_id = request
            .headers()
            .get(&HEADER_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| Uuid::now_v7().to_string(), str::to_string);

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            url = %request.uri(),
            peer = ?peer,
        );

        async move {
            let meta = RequestMeta {
                request_id: request_id.clone(),
                peer,
            };
            let (mut response, state) = self.route(request, &meta).await;

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert(HEADER_REQUEST_ID.clone(), value);
            }
            tracing::info!(
                status = response.status().as_u16(),
                state = state,
                duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn route(&self, request: Request<Bytes>, meta: &RequestMeta) -> (Response<Bytes>, &'static str) {
        let path = request.uri().path();

        if path == HEALTH_PATH {
            return (self.healthz(), "health");
        }

        if let Some(auth) = AuthRoute::parse(path) {
            let url = match request_url(request.uri(), request.headers(), self.pipeline.behind_tls()) {
                Ok(url) => url,
                Err(e) => {
                    tracing::info!(error = %e, "Cannot reconstruct request URL");
                    return (status_response(StatusCode::BAD_REQUEST), "bad_request");
                }
            };
            let response = match auth {
                AuthRoute::ProviderList => self.login.provider_list(request.uri().query()),
                AuthRoute::Login(provider) => self.login.login(&self.pipeline, provider, &url),
                AuthRoute::Callback(provider) => {
                    let snapshot = self.snapshots.current();
                    self.login
                        .callback(&self.pipeline, &snapshot, provider, &url, request.headers())
                        .await
                }
            };
            return (response, "login");
        }

        let snapshot = self.snapshots.current();
        let outcome = self.pipeline.handle(&snapshot, request, meta).await;
        (outcome.response, outcome.state.as_str())
    }

    fn healthz(&self) -> Response<Bytes> {
        let report = self.health.liveness(self.snapshots.current().loaded_at());
        let status = if report.status.is_operational() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        match serde_json::to_vec(&report) {
            Ok(body) => {
                let mut response = Response::new(Bytes::from(body));
                *response.status_mut() = status;
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize health report");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// The gateway server.
#[derive(Debug)]
pub struct GatewayServer {
    addr: SocketAddr,
    shutdown_timeout: Duration,
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Create a server around prepared state.
    pub fn new(addr: SocketAddr, state: GatewayState) -> Self {
        Self {
            addr,
            shutdown_timeout: Duration::from_secs(30),
            state: Arc::new(state),
        }
    }

    /// Build the whole gateway from configuration.
    ///
    /// Loads the manifest, sets up the login providers and the upstream
    /// client. Fails on any invalid setting.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;

        let manifest_path = config
            .manifest
            .path
            .as_deref()
            .ok_or_else(|| GatewayError::config("manifest path is required"))?;
        let snapshot = Snapshot::load(manifest_path)?;
        tracing::info!(
            path = %manifest_path.display(),
            routes = snapshot.router().len(),
            "Manifest loaded"
        );

        let providers = ProviderRegistry::from_specs(&config.auth.oauth2_clients)?;
        tracing::info!(providers = ?providers.names().collect::<Vec<_>>(), "OAuth2 providers configured");

        let upstream = ProxyClient::new(config.server.upstream_timeout)?;
        let pipeline = AuthorizationPipeline::new(
            TokenCodec::new(config.auth.jwt_secret.as_bytes()),
            Arc::new(DefaultCookieController::new(config.secure_cookies())),
            Arc::new(upstream),
        )
        .with_behind_tls(config.server.behind_tls)
        .with_default_ttl(config.server.default_token_ttl);

        let state = GatewayState::new(
            pipeline,
            LoginHandler::new(providers),
            Arc::new(SnapshotHandle::new(snapshot)),
            Arc::new(HealthChecker::new()),
        );

        Ok(Self::new(config.socket_addr()?, state)
            .with_shutdown_timeout(config.server.shutdown_timeout))
    }

    /// Grace period for open connections on shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The configured bind address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The shared request state.
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Run until SIGTERM or SIGINT.
    pub async fn run(self) -> GatewayResult<()> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Bind the configured address and run until `shutdown` fires.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> GatewayResult<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::server(format!("failed to bind to {}: {e}", self.addr)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve an already bound listener until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> GatewayResult<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, version = crate::VERSION, "Gateway listening");

        let tracker = ConnectionTracker::new();
        self.state.health.set_ready(true);

        let mut stop = shutdown.recv();
        loop {
            tokio::select! {
                () = &mut stop => {
                    tracing::info!("Shutdown signal received, stopping accept loop");
                    break;
                }
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let state = Arc::clone(&self.state);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(state, stream, peer, shutdown).await {
                                tracing::debug!(peer = %peer, error = %e, "Connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }

        self.state.health.set_ready(false);
        tracing::info!(
            timeout = ?self.shutdown_timeout,
            connections = tracker.active_connections(),
            "Waiting for connections to close"
        );
        tokio::select! {
            () = tracker.wait_for_drain() => {
                tracing::info!("All connections closed");
            }
            () = tokio::time::sleep(self.shutdown_timeout) => {
                tracing::warn!(
                    connections = tracker.active_connections(),
                    "Shutdown timeout reached with connections still open"
                );
            }
        }

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn serve_connection(
    state: Arc<GatewayState>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let service = service_fn(move |request: Request<Incoming>| {
        let state = Arc::clone(&state);
        async move { Ok::<_, Infallible>(handle_incoming(&state, request, peer).await) }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            // Finish the in-flight request, then close.
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

async fn handle_incoming(
    state: &GatewayState,
    request: Request<Incoming>,
    peer: SocketAddr,
) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::info!(peer = %peer, error = %e, "Failed to read request body");
            return status_response(StatusCode::BAD_REQUEST).map(Full::new);
        }
    };

    state
        .handle(Request::from_parts(parts, body), Some(peer))
        .await
        .map(Full::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{Upstream, UpstreamRequest, UpstreamResponse};
    use async_trait::async_trait;
    use http::HeaderMap;
    use warden_config::Manifest;

    const MANIFEST: &str = r#"
proxies:
  - external_url: "http://www.example.com/"
    target: "http://www:80/"
acl:
  "http://www.example.com":
    paths:
      "/":
        - methods: ["GET"]
          emails: ["-"]
"#;

    struct Echo;

    #[async_trait]
    impl Upstream for Echo {
        async fn forward(&self, request: UpstreamRequest) -> GatewayResult<UpstreamResponse> {
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from(request.url.to_string()),
            })
        }
    }

    fn state() -> GatewayState {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        let pipeline = AuthorizationPipeline::new(
            TokenCodec::new(b"secret"),
            Arc::new(DefaultCookieController::new(false)),
            Arc::new(Echo),
        );
        GatewayState::new(
            pipeline,
            LoginHandler::new(ProviderRegistry::from_specs(&["github;id;secret"]).unwrap()),
            Arc::new(SnapshotHandle::new(Snapshot::from_manifest(&manifest).unwrap())),
            Arc::new(HealthChecker::new()),
        )
    }

    fn get(uri: &str) -> Request<Bytes> {
        Request::builder()
            .uri(uri)
            .header("host", "www.example.com")
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_healthz_reports_readiness() {
        let state = state();
        let response = state.handle(get("/healthz"), None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.health().set_ready(true);
        let response = state.handle(get("/healthz"), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_request_id_echoed() {
        let state = state();
        let mut request = get("/");
        request
            .headers_mut()
            .insert("x-request-id", HeaderValue::from_static("abc-123"));

        let response = state.handle(request, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "abc-123");
        assert_eq!(response.body().as_ref(), b"http://www/");
    }

    #[tokio::test]
    async fn test_request_id_generated() {
        let response = state().handle(get("/"), None).await;
        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_login_routes() {
        let state = state();

        let response = state.handle(get("/.auth/login"), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = state.handle(get("/.auth/github/login"), None).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert!(response.headers()["location"]
            .to_str()
            .unwrap()
            .starts_with("https://github.com/login/oauth/authorize?"));
        assert!(response.headers().contains_key("set-cookie"));

        let response = state.handle(get("/.auth/unknown/login"), None).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()["location"], "/.auth/login");
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = GatewayServer::new(addr, state()).with_shutdown_timeout(Duration::from_secs(1));
        let health = Arc::clone(server.state().health());
        let shutdown = ShutdownSignal::new();

        let task = tokio::spawn(server.serve(listener, shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(health.is_ready());

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(3), task).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
        assert!(!health.is_ready());
    }
}
