//! End-to-end tests of the authorization pipeline.
//!
//! Requests run through the real policy engine, token codec, cookie policy
//! and router. Only the backend is replaced by a recording double.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use http::{header, HeaderMap, Method, Request, Response, StatusCode};
use parking_lot::Mutex;
use warden_config::Manifest;
use warden_gateway::{
    AuthorizationPipeline, DefaultCookieController, GatewayError, GatewayResult, PipelineState,
    ProxyRouter, RequestMeta, Snapshot, Upstream, UpstreamRequest, UpstreamResponse,
};
use warden_policy::{AllowedScopes, MethodSet, PolicyEngine};
use warden_session::{SessionClaims, TokenCodec};

const SECRET: &[u8] = b"test-secret";

const MANIFEST: &str = r#"
proxies:
  - external_url: "http://app.example.com/"
    target: "http://backend:8000/"
    set_headers:
      Remote-User: ["warden"]
acl:
  "http://app.example.com":
    paths:
      "/":
        - methods: ["GET"]
          emails: ["-"]
      "/admin":
        - methods: ["GET"]
          emails: ["alice@example.com"]
        - methods: ["*"]
          emails: ["root@example.com"]
  "http://unrouted.example.com":
    paths:
      "/":
        - methods: ["GET"]
          emails: ["-"]
"#;

/// Backend double that records what it receives.
#[derive(Default)]
struct RecordingUpstream {
    requests: Mutex<Vec<UpstreamRequest>>,
    fail: bool,
}

impl RecordingUpstream {
    fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl Upstream for RecordingUpstream {
    async fn forward(&self, request: UpstreamRequest) -> GatewayResult<UpstreamResponse> {
        self.requests.lock().push(request);
        if self.fail {
            return Err(GatewayError::upstream("connection refused"));
        }
        Ok(UpstreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"backend"),
        })
    }
}

struct Harness {
    pipeline: AuthorizationPipeline,
    upstream: Arc<RecordingUpstream>,
    snapshot: Snapshot,
}

impl Harness {
    fn new() -> Self {
        Self::with_engine(Arc::new(RecordingUpstream::default()), |engine| engine)
    }

    fn with_engine(
        upstream: Arc<RecordingUpstream>,
        configure: impl FnOnce(PolicyEngine) -> PolicyEngine,
    ) -> Self {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        let engine = configure(PolicyEngine::new(manifest.policy_pool().unwrap()));
        let snapshot = Snapshot::new(
            Arc::new(engine),
            ProxyRouter::new(&manifest.proxies).unwrap(),
        );
        let pipeline = AuthorizationPipeline::new(
            TokenCodec::new(SECRET),
            Arc::new(DefaultCookieController::new(false)),
            Arc::clone(&upstream) as Arc<dyn Upstream>,
        );
        Self {
            pipeline,
            upstream,
            snapshot,
        }
    }

    async fn send(&self, request: Request<Bytes>) -> (Response<Bytes>, PipelineState) {
        let meta = RequestMeta {
            request_id: "req-1".to_string(),
            peer: Some(SocketAddr::from(([10, 0, 0, 7], 52000))),
        };
        let outcome = self.pipeline.handle(&self.snapshot, request, &meta).await;
        (outcome.response, outcome.state)
    }

    fn recorded(&self) -> usize {
        self.upstream.requests.lock().len()
    }
}

fn request(method: Method, host: &str, path: &str, token: Option<&str>) -> Request<Bytes> {
    let mut builder = Request::builder().method(method).uri(path).header(header::HOST, host);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("jwt={token}"));
    }
    builder.body(Bytes::new()).unwrap()
}

fn scopes(entries: &[(&str, &[&str])]) -> AllowedScopes {
    let mut scopes = AllowedScopes::new();
    for (path, methods) in entries {
        scopes.grant(*path, &MethodSet::new(methods.iter()).unwrap());
    }
    scopes
}

fn token_for(email: &str, scopes: AllowedScopes) -> String {
    TokenCodec::new(SECRET)
        .mint(&SessionClaims::new(email, scopes), Duration::from_secs(3600))
        .unwrap()
}

fn set_cookies(response: &Response<Bytes>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_public_path_bypasses_login() {
    let harness = Harness::new();
    let (response, state) = harness
        .send(request(Method::GET, "app.example.com", "/docs?page=2", None))
        .await;

    assert_eq!(state, PipelineState::PublicBypass);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"backend");
    assert!(set_cookies(&response).is_empty());

    let requests = harness.upstream.requests.lock();
    assert_eq!(requests[0].url.as_str(), "http://backend:8000/docs?page=2");
    assert_eq!(requests[0].headers["x-request-id"], "req-1");
    assert_eq!(requests[0].headers["x-forwarded-for"], "10.0.0.7");
}

#[tokio::test]
async fn test_missing_token_redirects_to_login() {
    let harness = Harness::new();
    let (response, state) = harness
        .send(request(Method::GET, "app.example.com", "/admin", None))
        .await;

    assert_eq!(state, PipelineState::Unauthenticated);
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/.auth/login?redirect_url=http%3A%2F%2Fapp.example.com%2Fadmin"
    );
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("redirect_after_login=")));
    assert_eq!(harness.recorded(), 0);
}

#[tokio::test]
async fn test_invalid_token_redirects_to_login() {
    let harness = Harness::new();
    let forged = TokenCodec::new(b"other-secret")
        .mint(
            &SessionClaims::new("alice@example.com", scopes(&[("/admin", &["GET"])])),
            Duration::from_secs(60),
        )
        .unwrap();

    let (response, state) = harness
        .send(request(Method::GET, "app.example.com", "/admin", Some(&forged)))
        .await;
    assert_eq!(state, PipelineState::Unauthenticated);
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_authorized_request_refreshes_token() {
    let harness = Harness::new();
    let token = token_for("alice@example.com", scopes(&[("/admin", &["GET"])]));

    let (response, state) = harness
        .send(request(Method::GET, "app.example.com", "/admin/users", Some(&token)))
        .await;

    assert_eq!(state, PipelineState::Authorized);
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).iter().any(|c| c.starts_with("jwt=")));
    assert_eq!(harness.recorded(), 1);
}

#[tokio::test]
async fn test_method_outside_scope_is_forbidden() {
    let harness = Harness::new();
    let token = token_for("alice@example.com", scopes(&[("/admin", &["GET"])]));

    let (response, state) = harness
        .send(request(Method::DELETE, "app.example.com", "/admin/users", Some(&token)))
        .await;

    assert_eq!(state, PipelineState::Forbidden);
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(harness.recorded(), 0);
}

#[tokio::test]
async fn test_token_older_than_policy_gets_fresh_scopes() {
    let harness = Harness::with_engine(Arc::new(RecordingUpstream::default()), |engine| {
        engine.with_loaded_at(Utc::now())
    });
    // Issued under a policy that only allowed DELETE.
    let token = TokenCodec::new(SECRET)
        .mint_at(
            &SessionClaims::new("alice@example.com", scopes(&[("/admin", &["DELETE"])])),
            Utc::now() - chrono::Duration::minutes(10),
            Duration::from_secs(3600),
        )
        .unwrap();

    let (response, state) = harness
        .send(request(Method::GET, "app.example.com", "/admin", Some(&token)))
        .await;
    assert_eq!(state, PipelineState::Authorized);
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_newer_than_policy_keeps_its_scopes() {
    let harness = Harness::with_engine(Arc::new(RecordingUpstream::default()), |engine| {
        engine.with_loaded_at(Utc::now() - chrono::Duration::hours(1))
    });
    let token = token_for("alice@example.com", scopes(&[("/admin", &["DELETE"])]));

    let (response, state) = harness
        .send(request(Method::GET, "app.example.com", "/admin", Some(&token)))
        .await;
    assert_eq!(state, PipelineState::Forbidden);
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_undecodable_claims_are_internal_error() {
    let harness = Harness::new();
    let now = Utc::now().timestamp();
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &serde_json::json!({
            "email": "alice@example.com",
            "allowed_scopes": ["not", "a", "map"],
            "iat": now,
            "exp": now + 600,
        }),
        &jsonwebtoken::EncodingKey::from_secret(SECRET),
    )
    .unwrap();

    let (response, state) = harness
        .send(request(Method::GET, "app.example.com", "/admin", Some(&token)))
        .await;
    assert_eq!(state, PipelineState::InternalError);
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_public_path_without_route_is_not_found() {
    let harness = Harness::new();
    let (response, state) = harness
        .send(request(Method::GET, "unrouted.example.com", "/", None))
        .await;

    assert_eq!(state, PipelineState::RouteNotFound);
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let harness = Harness::with_engine(Arc::new(RecordingUpstream::failing()), |engine| engine);
    let (response, state) = harness
        .send(request(Method::GET, "app.example.com", "/", None))
        .await;

    assert_eq!(state, PipelineState::BadGateway);
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.body().as_ref(), b"Bad Gateway");
}

#[tokio::test]
async fn test_route_headers_replace_client_headers() {
    let harness = Harness::new();
    let mut req = request(Method::GET, "app.example.com", "/", None);
    req.headers_mut()
        .insert("remote-user", "mallory".parse().unwrap());
    req.headers_mut()
        .insert(header::CONNECTION, "keep-alive".parse().unwrap());

    let (_, state) = harness.send(req).await;
    assert_eq!(state, PipelineState::PublicBypass);

    let requests = harness.upstream.requests.lock();
    let values: Vec<_> = requests[0]
        .headers
        .get_all("remote-user")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(values, vec!["warden"]);
    assert!(!requests[0].headers.contains_key(header::CONNECTION));
}
