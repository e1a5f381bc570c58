use crate::errors::AuthError;
use serde::Deserialize;
use tracing::debug;

/// OAuth client-credentials for the cloud API.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Exchanges client credentials for a bearer token. Tokens are not cached;
/// each call hits the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    client: reqwest::Client,
    credentials: ClientCredentials,
}

impl TokenProvider {
    pub fn new(client: reqwest::Client, credentials: ClientCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    pub async fn acquire_token(&self) -> Result<String, AuthError> {
        debug!("Requesting access token from {}", self.credentials.token_url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("audience", self.credentials.audience.as_str()),
        ];

        let response = self
            .client
            .post(&self.credentials.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(TokenResponse {
                access_token: Some(token),
            }) if !token.is_empty() => Ok(token),
            _ => Err(AuthError::MissingToken { body }),
        }
    }
}
