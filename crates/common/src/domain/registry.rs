use crate::domain::lifecycle_event::Metadata;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A registered device identity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Thing {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A publish/subscribe scope things connect to
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Input for creating a thing (the registry assigns id and key)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateThingInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Input for creating a channel
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateChannelInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// Authoritative registry of things and channels
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ThingsRegistry: Send + Sync {
    /// Create a thing and return its id
    async fn create_thing(&self, token: &str, input: CreateThingInput) -> DomainResult<String>;

    async fn view_thing(&self, token: &str, thing_id: &str) -> DomainResult<Thing>;

    async fn delete_thing(&self, token: &str, thing_id: &str) -> DomainResult<()>;

    /// Create a channel and return its id
    async fn create_channel(&self, token: &str, input: CreateChannelInput) -> DomainResult<String>;

    async fn view_channel(&self, token: &str, channel_id: &str) -> DomainResult<Channel>;

    async fn delete_channel(&self, token: &str, channel_id: &str) -> DomainResult<()>;

    async fn connect(&self, token: &str, channel_id: &str, thing_id: &str) -> DomainResult<()>;

    async fn disconnect(&self, token: &str, channel_id: &str, thing_id: &str) -> DomainResult<()>;
}

/// Resolves an access token to the identity that owns it
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identify(&self, token: &str) -> DomainResult<String>;
}

/// Exchanges user credentials for an access token
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_token(&self, email: &str, password: &str) -> DomainResult<String>;
}
