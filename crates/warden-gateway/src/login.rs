//! The `/.auth/*` login endpoints.
//!
//! - `/.auth/login` lists the configured providers.
//! - `/.auth/{provider}/login` starts the OAuth2 flow.
//! - `/.auth/{provider}/callback` finishes it, mints the session token and
//!   sends the browser back where it came from.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Response, StatusCode};
use rand::RngCore;
use url::Url;
use warden_policy::origin_of;
use warden_session::SessionClaims;

use crate::oauth2::ProviderRegistry;
use crate::pipeline::{redirect_response, status_response, AuthorizationPipeline, LOGIN_PATH};
use crate::reload::Snapshot;

const AUTH_PREFIX: &str = "/.auth/";

/// A recognised `/.auth/*` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRoute<'a> {
    /// `/.auth/login`
    ProviderList,
    /// `/.auth/{provider}/login`
    Login(&'a str),
    /// `/.auth/{provider}/callback`
    Callback(&'a str),
}

impl<'a> AuthRoute<'a> {
    /// Parse a request path.
    pub fn parse(path: &'a str) -> Option<Self> {
        let rest = path.strip_prefix(AUTH_PREFIX)?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest == "login" {
            return Some(Self::ProviderList);
        }
        match rest.split_once('/')? {
            (provider, "login") if !provider.is_empty() => Some(Self::Login(provider)),
            (provider, "callback") if !provider.is_empty() => Some(Self::Callback(provider)),
            _ => None,
        }
    }
}

/// A random OAuth2 state value: 16 bytes, URL-safe base64.
pub fn new_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn html_response(status: StatusCode, body: String) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Page that sends the browser on to `target`.
///
/// A page rather than a 3xx so the `SameSite=Strict` session cookie set on
/// this response is sent with the next request.
pub fn client_side_redirect(target: &str) -> String {
    let attr = html_escape(target);
    let js = serde_json::to_string(target)
        .unwrap_or_else(|_| "\"/\"".to_string())
        .replace('<', "\\u003c");
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta http-equiv="refresh" content="0; url={attr}">
    <script type="text/javascript">window.location.href = {js};</script>
    <title>Redirecting...</title>
</head>
<body>
    <p>If you are not redirected automatically, follow this <a href="{attr}">link</a>.</p>
</body>
</html>
"#
    )
}

/// The post-login target: the cookie value if it is on the same origin.
fn same_origin_target(cookie: Option<String>, url: &Url) -> String {
    cookie
        .and_then(|raw| Url::parse(&raw).ok())
        .filter(|target| origin_of(target) == origin_of(url))
        .map_or_else(|| "/".to_string(), |target| target.to_string())
}

fn login_page_redirect() -> Response<Bytes> {
    redirect_response(StatusCode::TEMPORARY_REDIRECT, LOGIN_PATH)
}

/// Serves the `/.auth/*` endpoints.
#[derive(Debug, Clone)]
pub struct LoginHandler {
    providers: ProviderRegistry,
}

impl LoginHandler {
    /// Create a handler for the given providers.
    pub fn new(providers: ProviderRegistry) -> Self {
        Self { providers }
    }

    /// The provider registry.
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// `/.auth/login`: one link per provider, keeping the query string.
    pub fn provider_list(&self, query: Option<&str>) -> Response<Bytes> {
        let query = html_escape(query.unwrap_or(""));
        let links: String = self
            .providers
            .names()
            .map(|name| {
                let name = html_escape(name);
                format!("    <div><a href=\"/.auth/{name}/login?{query}\">{name}</a></div>\n")
            })
            .collect();
        html_response(
            StatusCode::OK,
            format!(
                "<!DOCTYPE html>\n<html>\n<head><title>Sign in</title></head>\n<body>\n{links}</body>\n</html>\n"
            ),
        )
    }

    /// `/.auth/{provider}/login`: set the state cookie and go to the provider.
    pub fn login(
        &self,
        pipeline: &AuthorizationPipeline,
        provider: &str,
        url: &Url,
    ) -> Response<Bytes> {
        let Some(idp) = self.providers.get(provider) else {
            tracing::info!(provider = %provider, "Unknown OAuth2 provider");
            return login_page_redirect();
        };

        let state = new_state();
        let redirect_uri = callback_url(url, provider);
        let mut response = redirect_response(
            StatusCode::TEMPORARY_REDIRECT,
            &idp.authorization_url(&state, &redirect_uri),
        );
        pipeline
            .cookies()
            .set_oauth2_state(&state)
            .append_to(response.headers_mut());
        response
    }

    /// `/.auth/{provider}/callback`: exchange the code and start a session.
    pub async fn callback(
        &self,
        pipeline: &AuthorizationPipeline,
        snapshot: &Snapshot,
        provider: &str,
        url: &Url,
        headers: &HeaderMap,
    ) -> Response<Bytes> {
        let Some(idp) = self.providers.get(provider) else {
            tracing::info!(provider = %provider, "Unknown OAuth2 provider");
            return login_page_redirect();
        };
        let cookies = pipeline.cookies();

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => {
                    tracing::warn!(provider = %provider, error = %value, "Provider refused authorization");
                    return login_page_redirect();
                }
                _ => {}
            }
        }

        let expected = cookies.oauth2_state(headers);
        if state.is_none() || state != expected {
            tracing::warn!(provider = %provider, "OAuth2 state mismatch");
            return login_page_redirect();
        }
        let Some(code) = code.filter(|c| !c.is_empty()) else {
            tracing::warn!(provider = %provider, "OAuth2 callback without code");
            return login_page_redirect();
        };

        let redirect_uri = callback_url(url, provider);
        let access_token = match idp.exchange_code(&code, &redirect_uri).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "Failed to exchange authorization code");
                return login_page_redirect();
            }
        };
        let identity = match idp.fetch_identity(&access_token).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::error!(provider = %provider, error = %e, "Failed to fetch identity");
                return login_page_redirect();
            }
        };

        let policy = snapshot.policy();
        let scopes = policy.allowed_scopes(url, &identity.email);
        if scopes.is_empty() {
            tracing::info!(provider = %provider, email = %identity.email, "No scopes for user");
            let mut response = status_response(StatusCode::FORBIDDEN);
            cookies.clear_oauth2_state().append_to(response.headers_mut());
            return response;
        }

        let mut claims = SessionClaims::new(identity.email.as_str(), scopes)
            .with_roles(policy.roles(url, &identity.email));
        claims.extras = identity.extras;

        let ttl = pipeline.token_ttl(snapshot, url);
        let token = match pipeline.codec().mint(&claims, ttl) {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(email = %claims.email, error = %e, "Failed to mint session token");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let target = same_origin_target(cookies.redirect_after_login(headers), url);
        tracing::info!(provider = %provider, email = %claims.email, redirect = %target, "Login succeeded");

        let mut response = html_response(StatusCode::OK, client_side_redirect(&target));
        let response_headers = response.headers_mut();
        cookies.set_session(&token, ttl).append_to(response_headers);
        cookies.clear_oauth2_state().append_to(response_headers);
        cookies.clear_redirect_after_login().append_to(response_headers);
        response
    }
}

fn callback_url(url: &Url, provider: &str) -> String {
    format!("{}{AUTH_PREFIX}{provider}/callback", origin_of(url))
}
