//! The per-request authorization pipeline.
//!
//! ```text
//! request ──► login required? ──no──────────────────────────────► dispatch
//!                 │yes
//!                 ▼
//!             token valid? ──no──► 302 /.auth/login
//!                 │yes
//!                 ▼
//!             claims decode ──err──► 500
//!                 │
//!                 ▼
//!             stale token? ──yes──► recompute scopes and roles
//!                 │
//!                 ▼
//!             scope allows? ──no──► 403
//!                 │yes
//!                 ▼
//!             re-mint token, set cookie ─────────────────────────► dispatch
//! ```
//!
//! Dispatch finds the proxy route (404 if none) and forwards the request
//! (502 if the backend fails).

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, Request, Response, StatusCode};
use url::Url;
use warden_session::{SessionClaims, TokenCodec};

use crate::cookie::CookieController;
use crate::reload::Snapshot;
use crate::request_url::request_url;
use crate::upstream::{filter_hop_by_hop, ForwardedHeaders, Upstream, UpstreamRequest};

/// Where the login page lives.
pub const LOGIN_PATH: &str = "/.auth/login";

const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// How a request left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No login needed; forwarded without reading any token.
    PublicBypass,
    /// Missing or invalid token; sent to login.
    Unauthenticated,
    /// Valid token without a matching scope.
    Forbidden,
    /// Valid token with a matching scope; forwarded.
    Authorized,
    /// No proxy route for the URL.
    RouteNotFound,
    /// The backend could not be reached.
    BadGateway,
    /// The request URL could not be reconstructed.
    BadRequest,
    /// Claims could not be decoded or a token could not be minted.
    InternalError,
}

impl PipelineState {
    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicBypass => "public_bypass",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::Authorized => "authorized",
            Self::RouteNotFound => "route_not_found",
            Self::BadGateway => "bad_gateway",
            Self::BadRequest => "bad_request",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection facts the pipeline needs besides the request itself.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Correlation ID, also sent upstream as `X-Request-Id`.
    pub request_id: String,
    /// The connecting peer.
    pub peer: Option<SocketAddr>,
}

/// Response plus the state that produced it.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// The response to send.
    pub response: Response<Bytes>,
    /// How the request was handled.
    pub state: PipelineState,
}

impl PipelineOutcome {
    fn new(response: Response<Bytes>, state: PipelineState) -> Self {
        Self { response, state }
    }
}

/// A plain-text response.
pub fn text_response(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// The generic response for a status.
pub fn status_response(status: StatusCode) -> Response<Bytes> {
    let body = match status {
        StatusCode::BAD_REQUEST => "Bad Request",
        StatusCode::FORBIDDEN => "Forbidden",
        StatusCode::NOT_FOUND => "Not Found",
        StatusCode::BAD_GATEWAY => "Bad Gateway",
        _ => "Internal Server Error",
    };
    text_response(status, body)
}

/// A redirect with an empty body.
pub fn redirect_response(status: StatusCode, location: &str) -> Response<Bytes> {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = status;
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(e) => {
            tracing::error!(location = %location, error = %e, "Invalid redirect location");
            status_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// The token from `Authorization: Bearer`, else the session cookie.
pub fn session_token(headers: &HeaderMap, cookies: &dyn CookieController) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| cookies.session_token(headers))
}

/// Decides, per request, whether to forward, redirect to login or refuse.
pub struct AuthorizationPipeline {
    codec: TokenCodec,
    cookies: Arc<dyn CookieController>,
    upstream: Arc<dyn Upstream>,
    behind_tls: bool,
    default_ttl: Duration,
}

impl fmt::Debug for AuthorizationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationPipeline")
            .field("behind_tls", &self.behind_tls)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl AuthorizationPipeline {
    /// Create a pipeline.
    pub fn new(
        codec: TokenCodec,
        cookies: Arc<dyn CookieController>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            codec,
            cookies,
            upstream,
            behind_tls: false,
            default_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Assume `https` when no `X-Forwarded-Proto` is sent.
    #[must_use]
    pub fn with_behind_tls(mut self, behind_tls: bool) -> Self {
        self.behind_tls = behind_tls;
        self
    }

    /// Token lifetime for origins that set none.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// The token codec.
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// The cookie policy.
    pub fn cookies(&self) -> &dyn CookieController {
        self.cookies.as_ref()
    }

    /// Whether the listener sits behind TLS termination.
    pub fn behind_tls(&self) -> bool {
        self.behind_tls
    }

    /// Token lifetime for the origin of `url`.
    pub fn token_ttl(&self, snapshot: &Snapshot, url: &Url) -> Duration {
        snapshot
            .policy()
            .origin_config(url)
            .and_then(|config| config.jwt_expiry_in)
            .unwrap_or(self.default_ttl)
    }

    /// Run one request through the pipeline.
    pub async fn handle(
        &self,
        snapshot: &Snapshot,
        request: Request<Bytes>,
        meta: &RequestMeta,
    ) -> PipelineOutcome {
        let url = match request_url(request.uri(), request.headers(), self.behind_tls) {
            Ok(url) => url,
            Err(e) => {
                tracing::info!(error = %e, "Cannot reconstruct request URL");
                return PipelineOutcome::new(
                    status_response(StatusCode::BAD_REQUEST),
                    PipelineState::BadRequest,
                );
            }
        };
        let method = request.method().as_str().to_string();
        let policy = snapshot.policy();

        if !policy.login_required(&url, &method) {
            return self
                .dispatch(snapshot, request, &url, meta, PipelineState::PublicBypass)
                .await;
        }

        let Some(token) = session_token(request.headers(), self.cookies.as_ref()) else {
            tracing::debug!(url = %url, "No session token");
            return self.unauthenticated(&url);
        };

        let verified = match self.codec.verify(&token) {
            Ok(verified) => verified,
            Err(e) if e.is_expired() => {
                tracing::info!(url = %url, "Session token expired");
                return self.unauthenticated(&url);
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Session token rejected");
                return self.unauthenticated(&url);
            }
        };

        let mut claims: SessionClaims = match verified.claims() {
            Ok(claims) => claims,
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Failed to decode session claims");
                return PipelineOutcome::new(
                    status_response(StatusCode::INTERNAL_SERVER_ERROR),
                    PipelineState::InternalError,
                );
            }
        };

        if verified.issued_before(policy.loaded_at()) {
            tracing::debug!(
                email = %claims.email,
                issued_at = %verified.issued_at(),
                loaded_at = %policy.loaded_at(),
                "Token predates policy, recomputing scopes"
            );
            claims.allowed_scopes = policy.allowed_scopes(&url, &claims.email);
            claims.roles = policy.roles(&url, &claims.email);
        }

        if !claims.allowed_scopes.matches(url.path(), &method) {
            tracing::info!(email = %claims.email, url = %url, method = %method, "Access denied");
            return PipelineOutcome::new(
                status_response(StatusCode::FORBIDDEN),
                PipelineState::Forbidden,
            );
        }

        let ttl = self.token_ttl(snapshot, &url);
        let refreshed = match self.codec.mint(&claims, ttl) {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(email = %claims.email, error = %e, "Failed to mint session token");
                return PipelineOutcome::new(
                    status_response(StatusCode::INTERNAL_SERVER_ERROR),
                    PipelineState::InternalError,
                );
            }
        };

        let mut outcome = self
            .dispatch(snapshot, request, &url, meta, PipelineState::Authorized)
            .await;
        self.cookies
            .set_session(&refreshed, ttl)
            .append_to(outcome.response.headers_mut());
        outcome
    }

    fn unauthenticated(&self, url: &Url) -> PipelineOutcome {
        let location = format!(
            "{LOGIN_PATH}?redirect_url={}",
            urlencoding::encode(url.as_str())
        );
        let mut response = redirect_response(StatusCode::FOUND, &location);
        if let Some(cookie) = self.cookies.set_redirect_after_login(url) {
            cookie.append_to(response.headers_mut());
        }
        PipelineOutcome::new(response, PipelineState::Unauthenticated)
    }

    async fn dispatch(
        &self,
        snapshot: &Snapshot,
        request: Request<Bytes>,
        url: &Url,
        meta: &RequestMeta,
        state: PipelineState,
    ) -> PipelineOutcome {
        let Some(target) = snapshot.router().match_route(url.as_str()) else {
            tracing::info!(url = %url, "No proxy route");
            return PipelineOutcome::new(
                status_response(StatusCode::NOT_FOUND),
                PipelineState::RouteNotFound,
            );
        };

        let (parts, body) = request.into_parts();
        let mut headers = filter_hop_by_hop(&parts.headers);
        ForwardedHeaders::new(meta.request_id.as_str(), url, meta.peer.map(|p| p.ip()))
            .add_to_headers(&mut headers);
        target.apply_headers(&mut headers);

        let upstream_url = target.upstream_uri(url);
        tracing::debug!(upstream = %upstream_url, "Forwarding request");

        let forwarded = UpstreamRequest {
            method: parts.method,
            url: upstream_url.clone(),
            headers,
            body,
        };
        match self.upstream.forward(forwarded).await {
            Ok(upstream) => {
                let mut response = Response::new(upstream.body);
                *response.status_mut() = upstream.status;
                *response.headers_mut() = upstream.headers;
                PipelineOutcome::new(response, state)
            }
            Err(e) => {
                tracing::error!(upstream = %upstream_url, error = %e, "Upstream request failed");
                PipelineOutcome::new(
                    status_response(StatusCode::BAD_GATEWAY),
                    PipelineState::BadGateway,
                )
            }
        }
    }
}
