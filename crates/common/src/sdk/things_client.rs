use crate::domain::{
    Channel, CreateChannelInput, CreateThingInput, DomainResult, Thing, ThingsRegistry,
};
use crate::sdk::http::{HttpClient, SdkConfig, created_id, transport_error};
use async_trait::async_trait;
use reqwest::Method;
use tracing::instrument;

const THINGS_PATH: &str = "/things";
const CHANNELS_PATH: &str = "/channels";

/// HTTP client for the things registry
pub struct HttpThingsRegistry {
    http: HttpClient,
}

impl HttpThingsRegistry {
    pub fn new(config: &SdkConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }

    async fn create(&self, token: &str, path: &str, body: serde_json::Value) -> DomainResult<String> {
        let response = self
            .http
            .send(self.http.request(Method::POST, path, token).json(&body))
            .await?;
        created_id(&response, &format!("{}/", path))
    }

    async fn view<T: serde::de::DeserializeOwned>(&self, token: &str, path: &str) -> DomainResult<T> {
        let response = self
            .http
            .send(self.http.request(Method::GET, path, token))
            .await?;
        response.json::<T>().await.map_err(transport_error)
    }

    async fn delete(&self, token: &str, path: &str) -> DomainResult<()> {
        self.http
            .send(self.http.request(Method::DELETE, path, token))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ThingsRegistry for HttpThingsRegistry {
    #[instrument(skip(self, token, input), fields(name = %input.name))]
    async fn create_thing(&self, token: &str, input: CreateThingInput) -> DomainResult<String> {
        let body = serde_json::to_value(&input).map_err(anyhow::Error::new)?;
        self.create(token, THINGS_PATH, body).await
    }

    #[instrument(skip(self, token))]
    async fn view_thing(&self, token: &str, thing_id: &str) -> DomainResult<Thing> {
        self.view(token, &format!("{}/{}", THINGS_PATH, thing_id))
            .await
    }

    #[instrument(skip(self, token))]
    async fn delete_thing(&self, token: &str, thing_id: &str) -> DomainResult<()> {
        self.delete(token, &format!("{}/{}", THINGS_PATH, thing_id))
            .await
    }

    #[instrument(skip(self, token, input), fields(name = %input.name))]
    async fn create_channel(&self, token: &str, input: CreateChannelInput) -> DomainResult<String> {
        let body = serde_json::to_value(&input).map_err(anyhow::Error::new)?;
        self.create(token, CHANNELS_PATH, body).await
    }

    #[instrument(skip(self, token))]
    async fn view_channel(&self, token: &str, channel_id: &str) -> DomainResult<Channel> {
        self.view(token, &format!("{}/{}", CHANNELS_PATH, channel_id))
            .await
    }

    #[instrument(skip(self, token))]
    async fn delete_channel(&self, token: &str, channel_id: &str) -> DomainResult<()> {
        self.delete(token, &format!("{}/{}", CHANNELS_PATH, channel_id))
            .await
    }

    #[instrument(skip(self, token))]
    async fn connect(&self, token: &str, channel_id: &str, thing_id: &str) -> DomainResult<()> {
        let path = connection_path(channel_id, thing_id);
        self.http
            .send(self.http.request(Method::PUT, &path, token))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn disconnect(&self, token: &str, channel_id: &str, thing_id: &str) -> DomainResult<()> {
        self.delete(token, &connection_path(channel_id, thing_id))
            .await
    }
}

fn connection_path(channel_id: &str, thing_id: &str) -> String {
    format!("{}/{}{}/{}", CHANNELS_PATH, channel_id, THINGS_PATH, thing_id)
}
