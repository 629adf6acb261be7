//! Map external URLs to backend targets.
//!
//! Routes are matched by plain string prefix against the full request URL,
//! longest external URL first, so `https://e.com/api/` wins over
//! `https://e.com/` for `https://e.com/api/users`.

use http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;
use warden_config::ProxyRoute;

use crate::error::{GatewayError, GatewayResult};

/// One resolved proxy route.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    key: String,
    external: Url,
    target: Url,
    strip_base: bool,
    headers: Vec<(HeaderName, Vec<HeaderValue>)>,
}

impl ProxyTarget {
    fn new(route: &ProxyRoute) -> GatewayResult<Self> {
        let external = Url::parse(route.external_url.trim()).map_err(|e| {
            GatewayError::config(format!("invalid external_url {:?}: {e}", route.external_url))
        })?;
        let raw_target = route.target.trim();
        let target = Url::parse(raw_target)
            .map_err(|e| GatewayError::config(format!("invalid target {:?}: {e}", route.target)))?;

        // `http://app:3000` and `http://app:3000/` parse to the same path, but
        // only the explicit trailing slash asks for the base path to be stripped.
        let strip_base = raw_target
            .split(['?', '#'])
            .next()
            .is_some_and(|p| p.ends_with('/') && p.matches('/').count() > 2);

        let mut headers = Vec::with_capacity(route.set_headers.len());
        for (name, values) in &route.set_headers {
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|e| GatewayError::config(format!("invalid header name {name:?}: {e}")))?;
            let values = values
                .iter()
                .map(|v| {
                    HeaderValue::from_str(v).map_err(|e| {
                        GatewayError::config(format!("invalid value for header {name}: {e}"))
                    })
                })
                .collect::<GatewayResult<Vec<_>>>()?;
            headers.push((name, values));
        }

        Ok(Self {
            key: external.as_str().to_string(),
            external,
            target,
            strip_base,
            headers,
        })
    }

    /// The external URL prefix this route serves.
    pub fn external(&self) -> &Url {
        &self.external
    }

    /// The backend base URL.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// The URL to forward a request to.
    ///
    /// When the target ends in `/`, the external base path is removed from
    /// the forwarded path. Target and request paths are joined with a single
    /// slash and the target query comes before the request query.
    pub fn upstream_uri(&self, request_url: &Url) -> Url {
        let mut path = request_url.path();
        if self.strip_base {
            let base = self.external.path().trim_end_matches('/');
            if let Some(rest) = path.strip_prefix(base) {
                path = rest;
            }
        }

        let mut upstream = self.target.clone();
        upstream.set_path(&single_joining_slash(self.target.path(), path));
        let query = match (self.target.query(), request_url.query()) {
            (Some(t), Some(r)) if !t.is_empty() && !r.is_empty() => Some(format!("{t}&{r}")),
            (Some(t), _) if !t.is_empty() => Some(t.to_string()),
            (_, Some(r)) if !r.is_empty() => Some(r.to_string()),
            _ => None,
        };
        upstream.set_query(query.as_deref());
        upstream.set_fragment(None);
        upstream
    }

    /// Set the configured headers, replacing what the client sent.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        for (name, values) in &self.headers {
            headers.remove(name);
            for value in values {
                headers.append(name.clone(), value.clone());
            }
        }
    }
}

fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}

/// Longest-prefix router over the manifest's proxy routes.
#[derive(Debug, Clone, Default)]
pub struct ProxyRouter {
    targets: Vec<ProxyTarget>,
}

impl ProxyRouter {
    /// Build the router.
    pub fn new(routes: &[ProxyRoute]) -> GatewayResult<Self> {
        let mut targets = routes
            .iter()
            .map(ProxyTarget::new)
            .collect::<GatewayResult<Vec<_>>>()?;
        targets.sort_by(|a, b| b.key.len().cmp(&a.key.len()));
        Ok(Self { targets })
    }

    /// Find the route for a full request URL.
    pub fn match_route(&self, request_url: &str) -> Option<&ProxyTarget> {
        self.targets
            .iter()
            .find(|t| request_url.starts_with(t.key.as_str()))
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether there are no routes.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
