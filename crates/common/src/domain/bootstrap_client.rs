use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device lifecycle state of a bootstrap config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapState {
    #[default]
    Inactive,
    Active,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Request to register a bootstrap config for an existing or new thing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BootstrapRequest {
    /// Existing thing to bind; a new thing is created when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thing_id: Option<String>,
    pub external_id: String,
    pub external_key: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub client_cert: String,
    #[serde(default)]
    pub client_key: String,
    #[serde(default)]
    pub ca_cert: String,
}

/// Bootstrap entry as seen by remote callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    pub thing_id: String,
    pub external_id: String,
    pub state: BootstrapState,
}

/// Operator-side access to the bootstrap store
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BootstrapClient: Send + Sync {
    /// Register a config and return the bound thing id
    async fn add_config(&self, token: &str, request: BootstrapRequest) -> DomainResult<String>;

    async fn view_config(&self, token: &str, thing_id: &str) -> DomainResult<BootstrapSummary>;

    async fn remove_config(&self, token: &str, thing_id: &str) -> DomainResult<()>;

    async fn change_state(
        &self,
        token: &str,
        thing_id: &str,
        state: BootstrapState,
    ) -> DomainResult<()>;
}
