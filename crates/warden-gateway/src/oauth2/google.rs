//! Google OAuth2 provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{http_client, ClientCredentials, Identity, IdentityProvider, TokenResponse};
use crate::error::{GatewayError, GatewayResult};

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPE: &str = "email";

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    email_verified: Option<bool>,
}

impl GoogleUserInfo {
    fn verified_email(self) -> GatewayResult<String> {
        match (self.email, self.email_verified) {
            (Some(_), Some(false)) => Err(GatewayError::oauth2("google", "email not verified")),
            (Some(email), _) if !email.is_empty() => Ok(email),
            _ => Err(GatewayError::oauth2("google", "userinfo had no email")),
        }
    }
}

/// Google OAuth2 provider.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    credentials: ClientCredentials,
    http_client: Client,
}

impl GoogleProvider {
    /// Create a new Google provider.
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            credentials,
            http_client: http_client(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=offline&prompt=consent",
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
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .http_client
            .post(TOKEN_ENDPOINT)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::oauth2("google", format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::oauth2(
                "google",
                format!("token endpoint returned {status}"),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::oauth2("google", format!("invalid token response: {e}")))?;
        token.into_access_token("google")
    }

    async fn fetch_identity(&self, access_token: &str) -> GatewayResult<Identity> {
        let response = self
            .http_client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GatewayError::oauth2("google", format!("userinfo request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::oauth2(
                "google",
                format!("userinfo endpoint returned {status}"),
            ));
        }

        let info: GoogleUserInfo = response
            .json()
            .await
            .map_err(|e| GatewayError::oauth2("google", format!("invalid userinfo: {e}")))?;
        Ok(Identity::new(info.verified_email()?))
    }
}
