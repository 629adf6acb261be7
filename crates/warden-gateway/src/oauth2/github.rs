//! GitHub OAuth2 provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{http_client, ClientCredentials, Identity, IdentityProvider, TokenResponse};
use crate::error::{GatewayError, GatewayResult};

const AUTHORIZATION_ENDPOINT: &str = "https://github.com/login/oauth/authorize";
const TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";
const USERINFO_ENDPOINT: &str = "https://api.github.com/user";
const USER_EMAILS_ENDPOINT: &str = "https://api.github.com/user/emails";
const SCOPE: &str = "user:email";
const USER_AGENT: &str = "warden-gateway";

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Pick the primary verified address.
fn primary_verified(emails: &[GithubEmail]) -> Option<&str> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email.as_str())
}

/// GitHub OAuth2 provider.
#[derive(Debug, Clone)]
pub struct GithubProvider {
    credentials: ClientCredentials,
    http_client: Client,
}

impl GithubProvider {
    /// Create a new GitHub provider.
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            credentials,
            http_client: http_client(),
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> GatewayResult<T> {
        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GatewayError::oauth2("github", format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::oauth2(
                "github",
                format!("GET {url} returned {status}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::oauth2("github", format!("invalid response from {url}: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn name(&self) -> &str {
        "github"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}",
            AUTHORIZATION_ENDPOINT,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(SCOPE),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> GatewayResult<String> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::oauth2("github", format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::oauth2(
                "github",
                format!("token endpoint returned {status}"),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::oauth2("github", format!("invalid token response: {e}")))?;
        token.into_access_token("github")
    }

    async fn fetch_identity(&self, access_token: &str) -> GatewayResult<Identity> {
        let emails: Vec<GithubEmail> = self.get_json(USER_EMAILS_ENDPOINT, access_token).await?;
        let email = primary_verified(&emails)
            .ok_or_else(|| GatewayError::oauth2("github", "no primary verified email"))?
            .to_string();

        let user: GithubUser = self.get_json(USERINFO_ENDPOINT, access_token).await?;
        Ok(Identity::new(email).with_extra("username", user.login))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GithubProvider {
        GithubProvider::new(ClientCredentials {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        })
    }

    #[test]
    fn test_authorization_url() {
        let url = provider().authorization_url(
            "state-token",
            "https://wiki.example.com/.auth/github/callback",
        );

        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("state=state-token"));
        assert!(url.contains("scope=user%3Aemail"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fwiki.example.com%2F.auth%2Fgithub%2Fcallback"
        ));
        assert!(!url.contains("client-secret"));
    }

    #[test]
    fn test_primary_verified_email() {
        let emails: Vec<GithubEmail> = serde_json::from_str(
            r#"[
                {"email": "old@example.com", "primary": false, "verified": true},
                {"email": "me@example.com", "primary": true, "verified": true}
            ]"#,
        )
        .unwrap();
        assert_eq!(primary_verified(&emails), Some("me@example.com"));
    }

    #[test]
    fn test_unverified_primary_rejected() {
        let emails: Vec<GithubEmail> = serde_json::from_str(
            r#"[{"email": "me@example.com", "primary": true, "verified": false}]"#,
        )
        .unwrap();
        assert_eq!(primary_verified(&emails), None);
    }

    #[test]
    fn test_name() {
        assert_eq!(provider().name(), "github");
    }
}
