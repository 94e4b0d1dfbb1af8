use crate::domain::{DomainError, DomainResult, IdentityProvider, TokenIssuer};
use crate::sdk::http::{HttpClient, SdkConfig, transport_error};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::instrument;

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct ProfileResponse {
    email: String,
}

/// HTTP client for the users service
pub struct HttpUsersClient {
    http: HttpClient,
}

impl HttpUsersClient {
    pub fn new(config: &SdkConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl TokenIssuer for HttpUsersClient {
    #[instrument(skip(self, password))]
    async fn issue_token(&self, email: &str, password: &str) -> DomainResult<String> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .http
            .send(self.http.request(Method::POST, "/tokens", "").json(&body))
            .await?;

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(transport_error)?
            .token;
        Ok(token)
    }
}

#[async_trait]
impl IdentityProvider for HttpUsersClient {
    #[instrument(skip_all)]
    async fn identify(&self, token: &str) -> DomainResult<String> {
        if token.is_empty() {
            return Err(DomainError::Unauthorized("missing token".to_string()));
        }

        let response = self
            .http
            .send(self.http.request(Method::GET, "/users/profile", token))
            .await?;

        let profile = response
            .json::<ProfileResponse>()
            .await
            .map_err(transport_error)?;
        Ok(profile.email)
    }
}
