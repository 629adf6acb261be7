//! Reconstruct the absolute URL a client asked for.
//!
//! Access policy and proxy routes are keyed by external URLs, so the gateway
//! needs the URL as the client saw it, not as it arrived after any load
//! balancers in front.

use http::header::HOST;
use http::HeaderMap;
use http::Uri;
use url::Url;

use crate::error::{GatewayError, GatewayResult};

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PORT: &str = "x-forwarded-port";

/// Build the canonical request URL.
///
/// Scheme comes from `X-Forwarded-Proto`, else `https` when `behind_tls`,
/// else `http`. Host comes from `X-Forwarded-Host` (with `X-Forwarded-Port`
/// unless it is 80 or 443), else `Host`, else the URI authority.
pub fn request_url(uri: &Uri, headers: &HeaderMap, behind_tls: bool) -> GatewayResult<Url> {
    let scheme = first_value(headers, X_FORWARDED_PROTO)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| if behind_tls { "https" } else { "http" }.to_string());

    let host = match first_value(headers, X_FORWARDED_HOST) {
        Some(host) => match first_value(headers, X_FORWARDED_PORT) {
            Some(port) if port != "80" && port != "443" && !host.contains(':') => {
                format!("{host}:{port}")
            }
            _ => host.to_string(),
        },
        None => headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
            .ok_or_else(|| GatewayError::internal("request has no host"))?,
    };

    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    Url::parse(&format!("{scheme}://{host}{path_and_query}"))
        .map_err(|e| GatewayError::internal(format!("invalid request URL: {e}")))
}

/// First comma-separated entry of a header, trimmed.
fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
