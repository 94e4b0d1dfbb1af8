use crate::domain::{DomainError, DomainResult};
use anyhow::Context;
use reqwest::header::{AUTHORIZATION, LOCATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Connection settings shared by the HTTP collaborator clients
#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub base_url: String,
    /// Bound on every request; expiry surfaces as `DomainError::Unavailable`
    pub timeout: Duration,
}

pub(crate) struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub(crate) fn new(config: &SdkConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if token.is_empty() {
            builder
        } else {
            builder.header(AUTHORIZATION, token)
        }
    }

    /// Send the request, mapping transport failures and non-2xx statuses
    pub(crate) async fn send(&self, builder: RequestBuilder) -> DomainResult<Response> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(url = %response.url(), status = %status, "collaborator responded");

        if status.is_success() {
            return Ok(response);
        }

        let path = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &path, &body))
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> DomainError {
    if e.is_timeout() || e.is_connect() {
        DomainError::Unavailable(e.to_string())
    } else {
        DomainError::RepositoryError(anyhow::Error::new(e))
    }
}

pub(crate) fn status_error(status: StatusCode, path: &str, body: &str) -> DomainError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DomainError::Unauthorized(format!("{} rejected credentials", path))
        }
        StatusCode::NOT_FOUND => DomainError::EntityNotFound(path.to_string()),
        StatusCode::CONFLICT => DomainError::Conflict(path.to_string()),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            DomainError::ValidationError(format!("{}: {}", path, body.trim()))
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            DomainError::Unavailable(format!("{} returned {}", path, status))
        }
        _ => DomainError::RepositoryError(anyhow::anyhow!(
            "{} returned unexpected status {}",
            path,
            status
        )),
    }
}

/// Id of a created entity, read from the `Location` header (`/things/<id>`)
pub(crate) fn created_id(response: &Response, prefix: &str) -> DomainResult<String> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            DomainError::RepositoryError(anyhow::anyhow!("created response has no Location header"))
        })?;

    id_from_location(location, prefix)
}

pub(crate) fn id_from_location(location: &str, prefix: &str) -> DomainResult<String> {
    location
        .strip_prefix(prefix)
        .map(|id| id.trim_matches('/'))
        .filter(|id| !id.is_empty() && !id.contains('/'))
        .map(str::to_string)
        .ok_or_else(|| {
            DomainError::RepositoryError(anyhow::anyhow!(
                "unexpected Location header: {}",
                location
            ))
        })
}
