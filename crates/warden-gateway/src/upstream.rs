//! Forwarding requests to backends.
//!
//! [`Upstream`] is the seam between the authorization pipeline and the
//! network. [`ProxyClient`] is the production implementation; tests use an
//! in-memory double.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use http::{Method, StatusCode};
use reqwest::redirect::Policy;
use reqwest::Client;
use url::Url;

use crate::error::{GatewayError, GatewayResult};

/// Header name for request ID.
pub static HEADER_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

static HEADER_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static HEADER_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
static HEADER_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Hop-by-hop headers, never forwarded in either direction.
pub static HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Check if a header is hop-by-hop.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Copy headers, dropping hop-by-hop headers and any named in `Connection`.
///
/// Multi-valued headers keep every value.
pub fn filter_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect();

    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// `X-Forwarded-*` and request ID headers added to every forwarded request.
#[derive(Debug, Clone)]
pub struct ForwardedHeaders {
    /// Request ID for correlation.
    pub request_id: String,
    /// Address of the connecting client.
    pub client_ip: Option<IpAddr>,
    /// Scheme the client used.
    pub proto: String,
    /// Host the client asked for.
    pub host: String,
}

impl ForwardedHeaders {
    /// Derive forwarded values from the canonical request URL.
    pub fn new(request_id: impl Into<String>, request_url: &Url, client_ip: Option<IpAddr>) -> Self {
        let host = match (request_url.host_str(), request_url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        Self {
            request_id: request_id.into(),
            client_ip,
            proto: request_url.scheme().to_string(),
            host,
        }
    }

    /// Add the headers, appending the client to any `X-Forwarded-For` chain.
    pub fn add_to_headers(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            headers.insert(HEADER_REQUEST_ID.clone(), value);
        }

        if let Some(ip) = self.client_ip {
            let chain = headers
                .get_all(&HEADER_FORWARDED_FOR)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(", ");
            let chain = if chain.is_empty() {
                ip.to_string()
            } else {
                format!("{chain}, {ip}")
            };
            if let Ok(value) = HeaderValue::from_str(&chain) {
                headers.insert(HEADER_FORWARDED_FOR.clone(), value);
            }
        }

        if let Ok(value) = HeaderValue::from_str(&self.proto) {
            headers.insert(HEADER_FORWARDED_PROTO.clone(), value);
        }

        if !self.host.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&self.host) {
                headers.insert(HEADER_FORWARDED_HOST.clone(), value);
            }
        }
    }
}

/// Request to be forwarded to a backend.
#[derive(Debug)]
pub struct UpstreamRequest {
    /// HTTP method.
    pub method: Method,
    /// Full backend URL.
    pub url: Url,
    /// Headers to send, already filtered.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

/// Response from a backend.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers, hop-by-hop headers removed.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

/// Sends requests to backends.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward one request. Errors are reported, never retried.
    async fn forward(&self, request: UpstreamRequest) -> GatewayResult<UpstreamResponse>;
}

/// HTTP client for forwarding requests to backends.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    timeout: Duration,
}

impl ProxyClient {
    /// Create a new proxy client.
    ///
    /// Redirects are passed back to the client, not followed.
    pub fn new(timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| GatewayError::upstream(format!("failed to create client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Get the timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Upstream for ProxyClient {
    async fn forward(&self, request: UpstreamRequest) -> GatewayResult<UpstreamResponse> {
        let mut headers = request.headers;
        headers.remove(HOST);
        headers.remove(CONTENT_LENGTH);

        let response = self
            .client
            .request(request.method, request.url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| GatewayError::upstream(format!("request failed: {e}")))?;

        let status = response.status();
        let mut headers = filter_hop_by_hop(response.headers());
        headers.remove(CONTENT_LENGTH);

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::upstream(format!("failed to read body: {e}")))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_is_hop_by_hop() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("authorization"));
        assert!(!is_hop_by_hop("cookie"));
    }

    #[test]
    fn test_filter_keeps_credentials_and_multi_values() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));
        headers.insert("cookie", HeaderValue::from_static("jwt=t"));
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));

        let filtered = filter_hop_by_hop(&headers);
        assert!(filtered.get("connection").is_none());
        assert!(filtered.get("keep-alive").is_none());
        assert!(filtered.get("x-private").is_none());
        assert!(filtered.get("authorization").is_some());
        assert!(filtered.get("cookie").is_some());
        assert_eq!(filtered.get_all("accept").iter().count(), 2);
    }

    #[test]
    fn test_forwarded_headers() {
        let url = Url::parse("https://wiki.example.com:8443/page").unwrap();
        let forwarded = ForwardedHeaders::new("req-1", &url, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        forwarded.add_to_headers(&mut headers);

        assert_eq!(headers.get("x-request-id").unwrap(), "req-1");
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "203.0.113.9, 10.0.0.7");
        assert_eq!(headers.get("x-forwarded-proto").unwrap(), "https");
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "wiki.example.com:8443");
    }

    #[test]
    fn test_forwarded_without_peer() {
        let url = Url::parse("http://www.example.com/").unwrap();
        let mut headers = HeaderMap::new();
        ForwardedHeaders::new("req-2", &url, None).add_to_headers(&mut headers);
        assert!(headers.get("x-forwarded-for").is_none());
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "www.example.com");
    }

    #[test]
    fn test_client_builds() {
        let client = ProxyClient::new(Duration::from_secs(5)).unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connection_refused_is_upstream_error() {
        let client = ProxyClient::new(Duration::from_secs(2)).unwrap();
        let request = UpstreamRequest {
            method: Method::GET,
            url: Url::parse("http://127.0.0.1:9/").unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        let err = client.forward(request).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }
}
