use crate::domain::{Cert, CertsClient, DomainResult};
use crate::sdk::http::{HttpClient, SdkConfig, transport_error};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Serialize)]
struct IssueCertRequest<'a> {
    thing_id: &'a str,
    thing_key: &'a str,
}

#[derive(Deserialize)]
struct IssueCertResponse {
    client_cert: String,
    client_key: String,
    #[serde(default)]
    issuing_ca: String,
}

/// HTTP client for the certificate authority
pub struct HttpCertsClient {
    http: HttpClient,
}

impl HttpCertsClient {
    pub fn new(config: &SdkConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl CertsClient for HttpCertsClient {
    #[instrument(skip(self, token, thing_key))]
    async fn issue_cert(&self, token: &str, thing_id: &str, thing_key: &str) -> DomainResult<Cert> {
        let body = IssueCertRequest {
            thing_id,
            thing_key,
        };
        let response = self
            .http
            .send(self.http.request(Method::POST, "/certs", token).json(&body))
            .await?;

        let issued = response
            .json::<IssueCertResponse>()
            .await
            .map_err(transport_error)?;
        Ok(Cert {
            client_cert: issued.client_cert,
            client_key: issued.client_key,
            ca_cert: issued.issuing_ca,
        })
    }

    #[instrument(skip(self, token))]
    async fn revoke_cert(&self, token: &str, thing_id: &str) -> DomainResult<()> {
        self.http
            .send(self.http.request(Method::DELETE, &format!("/certs/{}", thing_id), token))
            .await?;
        Ok(())
    }
}
