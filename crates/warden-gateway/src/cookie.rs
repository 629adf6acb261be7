//! Cookie parsing and the gateway's cookie policy.
//!
//! The gateway owns three cookies:
//!
//! | Name                   | Holds                          | SameSite | Max-Age   |
//! |------------------------|--------------------------------|----------|-----------|
//! | `jwt`                  | session token                  | Strict   | token TTL |
//! | `redirect_after_login` | URL to return to after login   | Lax      | 3600      |
//! | `oauth2_state`         | CSRF state for the OAuth2 flow | Lax      | 600       |
//!
//! All are `HttpOnly` with `Path=/`, and `Secure` when configured.
//! [`CookieController`] is the seam the pipeline and login handlers use, so
//! tests can swap in a different cookie policy.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use url::Url;

/// Session token cookie.
pub const SESSION_COOKIE: &str = "jwt";
/// Post-login redirect cookie.
pub const REDIRECT_COOKIE: &str = "redirect_after_login";
/// OAuth2 state cookie.
pub const STATE_COOKIE: &str = "oauth2_state";

const REDIRECT_MAX_AGE: Duration = Duration::from_secs(3600);
const STATE_MAX_AGE: Duration = Duration::from_secs(600);

/// Paths that never become a post-login redirect target.
const NO_REDIRECT_PREFIXES: [&str; 3] = ["/api/", "/.well-known/", "/_next/"];

/// Cookies sent by the client.
#[derive(Debug, Clone, Default)]
pub struct Cookies {
    cookies: HashMap<String, String>,
}

impl Cookies {
    /// Parse every `Cookie` header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = HashMap::new();
        for value in headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for cookie in value.split(';') {
                if let Some((name, value)) = cookie.trim().split_once('=') {
                    let value = value.trim().trim_matches('"');
                    cookies
                        .entry(name.trim().to_string())
                        .or_insert_with(|| value.to_string());
                }
            }
        }
        Self { cookies }
    }

    /// Get a cookie value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Number of cookies.
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether no cookies were sent.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// Sent with same-site requests and top-level navigations.
    #[default]
    Lax,
    /// Sent with same-site requests only.
    Strict,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lax => write!(f, "Lax"),
            Self::Strict => write!(f, "Strict"),
        }
    }
}

/// Builder for a `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    path: Option<String>,
    max_age: Option<Duration>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl SetCookie {
    /// Create a new Set-Cookie builder.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// Set the Path attribute.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the Max-Age attribute.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.max_age = Some(duration);
        self
    }

    /// Set the Secure attribute.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the `HttpOnly` attribute.
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set the `SameSite` attribute.
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Max-Age, if set.
    pub fn max_age_value(&self) -> Option<Duration> {
        self.max_age
    }

    /// Convert to a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];

        if let Some(ref path) = self.path {
            parts.push(format!("Path={path}"));
        }

        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={}", max_age.as_secs()));
        }

        if self.secure {
            parts.push("Secure".to_string());
        }

        if self.http_only {
            parts.push("HttpOnly".to_string());
        }

        if let Some(same_site) = self.same_site {
            parts.push(format!("SameSite={same_site}"));
        }

        parts.join("; ")
    }

    /// Append this cookie to response headers.
    pub fn append_to(&self, headers: &mut HeaderMap) {
        match HeaderValue::from_str(&self.to_header_value()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => tracing::error!(cookie = %self.name, error = %e, "Invalid Set-Cookie value"),
        }
    }
}

/// Reads and writes the gateway's cookies.
pub trait CookieController: Send + Sync {
    /// The session token cookie, if sent.
    fn session_token(&self, headers: &HeaderMap) -> Option<String>;

    /// The post-login redirect URL, if sent.
    fn redirect_after_login(&self, headers: &HeaderMap) -> Option<String>;

    /// The OAuth2 state, if sent.
    fn oauth2_state(&self, headers: &HeaderMap) -> Option<String>;

    /// Cookie carrying a freshly minted session token.
    fn set_session(&self, token: &str, ttl: Duration) -> SetCookie;

    /// Cookie remembering where to go after login.
    ///
    /// `None` for URLs that should never be returned to, such as API calls
    /// and static assets.
    fn set_redirect_after_login(&self, url: &Url) -> Option<SetCookie>;

    /// Cookie holding the OAuth2 state.
    fn set_oauth2_state(&self, state: &str) -> SetCookie;

    /// Cookie clearing the redirect URL.
    fn clear_redirect_after_login(&self) -> SetCookie;

    /// Cookie clearing the OAuth2 state.
    fn clear_oauth2_state(&self) -> SetCookie;
}

/// The standard cookie policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCookieController {
    secure: bool,
}

impl DefaultCookieController {
    /// Create a controller; `secure` adds the Secure attribute everywhere.
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn base(&self, name: &str, value: impl Into<String>, same_site: SameSite) -> SetCookie {
        SetCookie::new(name, value)
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(same_site)
    }
}

/// Whether a path may be returned to after login.
pub fn redirect_eligible(path: &str) -> bool {
    path != "/favicon.ico" && !NO_REDIRECT_PREFIXES.iter().any(|p| path.starts_with(p))
}

impl CookieController for DefaultCookieController {
    fn session_token(&self, headers: &HeaderMap) -> Option<String> {
        Cookies::from_headers(headers)
            .get(SESSION_COOKIE)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn redirect_after_login(&self, headers: &HeaderMap) -> Option<String> {
        let cookies = Cookies::from_headers(headers);
        let raw = cookies.get(REDIRECT_COOKIE).filter(|v| !v.is_empty())?;
        urlencoding::decode(raw).ok().map(|v| v.into_owned())
    }

    fn oauth2_state(&self, headers: &HeaderMap) -> Option<String> {
        Cookies::from_headers(headers)
            .get(STATE_COOKIE)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn set_session(&self, token: &str, ttl: Duration) -> SetCookie {
        self.base(SESSION_COOKIE, token, SameSite::Strict)
            .max_age(ttl)
    }

    fn set_redirect_after_login(&self, url: &Url) -> Option<SetCookie> {
        if !redirect_eligible(url.path()) {
            return None;
        }
        let value = urlencoding::encode(url.as_str()).into_owned();
        Some(self.base(REDIRECT_COOKIE, value, SameSite::Lax).max_age(REDIRECT_MAX_AGE))
    }

    fn set_oauth2_state(&self, state: &str) -> SetCookie {
        self.base(STATE_COOKIE, state, SameSite::Lax)
            .max_age(STATE_MAX_AGE)
    }

    fn clear_redirect_after_login(&self) -> SetCookie {
        self.base(REDIRECT_COOKIE, "", SameSite::Lax)
            .max_age(Duration::ZERO)
    }

    fn clear_oauth2_state(&self) -> SetCookie {
        self.base(STATE_COOKIE, "", SameSite::Lax)
            .max_age(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_cookie(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = Cookies::from_headers(&with_cookie("jwt=abc.def; theme=\"dark\"; broken"));
        assert_eq!(cookies.get("jwt"), Some("abc.def"));
        assert_eq!(cookies.get("theme"), Some("dark"));
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_parse_multiple_headers() {
        let mut headers = with_cookie("a=1");
        headers.append(COOKIE, HeaderValue::from_static("b=2"));
        let cookies = Cookies::from_headers(&headers);
        assert_eq!(cookies.get("a"), Some("1"));
        assert_eq!(cookies.get("b"), Some("2"));
    }

    #[test]
    fn test_no_cookie_header() {
        assert!(Cookies::from_headers(&HeaderMap::new()).is_empty());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let controller = DefaultCookieController::new(true);
        let header = controller
            .set_session("tok", Duration::from_secs(7200))
            .to_header_value();
        assert_eq!(
            header,
            "jwt=tok; Path=/; Max-Age=7200; Secure; HttpOnly; SameSite=Strict"
        );
    }

    #[test]
    fn test_insecure_cookie() {
        let controller = DefaultCookieController::new(false);
        let header = controller.set_oauth2_state("xyz").to_header_value();
        assert!(!header.contains("Secure"));
        assert!(header.contains("Max-Age=600"));
        assert!(header.contains("SameSite=Lax"));
    }

    #[test]
    fn test_redirect_cookie_round_trip() {
        let controller = DefaultCookieController::default();
        let url = Url::parse("http://wiki.example.com/page?a=1&b=two words").unwrap();
        let cookie = controller.set_redirect_after_login(&url).unwrap();
        assert!(!cookie.value().contains(';'));
        assert_eq!(cookie.max_age_value(), Some(Duration::from_secs(3600)));

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{}={}", REDIRECT_COOKIE, cookie.value())).unwrap(),
        );
        assert_eq!(
            controller.redirect_after_login(&headers).as_deref(),
            Some(url.as_str())
        );
    }

    #[test]
    fn test_redirect_skipped_for_assets() {
        let controller = DefaultCookieController::default();
        for path in ["/favicon.ico", "/api/users", "/.well-known/x", "/_next/static/a.js"] {
            let url = Url::parse(&format!("http://a.example.com{path}")).unwrap();
            assert!(controller.set_redirect_after_login(&url).is_none(), "{path}");
        }
        let url = Url::parse("http://a.example.com/apiary").unwrap();
        assert!(controller.set_redirect_after_login(&url).is_some());
    }

    #[test]
    fn test_clear_cookies() {
        let controller = DefaultCookieController::default();
        assert!(controller
            .clear_oauth2_state()
            .to_header_value()
            .contains("Max-Age=0"));
        assert_eq!(controller.clear_redirect_after_login().value(), "");
    }

    #[test]
    fn test_append_to_headers() {
        let mut headers = HeaderMap::new();
        SetCookie::new("a", "1").append_to(&mut headers);
        SetCookie::new("b", "2").append_to(&mut headers);
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_empty_session_cookie_ignored() {
        let controller = DefaultCookieController::default();
        assert!(controller.session_token(&with_cookie("jwt=")).is_none());
        assert_eq!(
            controller.session_token(&with_cookie("jwt=a.b.c")).as_deref(),
            Some("a.b.c")
        );
    }
}
