use common::domain::{BootstrapState, BootstrapSummary, Metadata};
use serde::{Deserialize, Serialize};

/// Local mirror of a registry channel a config references
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ChannelRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Binding between an external device and its provisioned thing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub thing_id: String,
    pub owner: String,
    #[serde(default)]
    pub name: String,
    pub thing_key: String,
    #[serde(default)]
    pub channels: Vec<ChannelRef>,
    pub external_id: String,
    pub external_key: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_cert: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_cert: String,
    #[serde(default)]
    pub state: BootstrapState,
}

impl BootstrapConfig {
    pub fn channel_ids(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.id.clone()).collect()
    }

    pub fn summary(&self) -> BootstrapSummary {
        BootstrapSummary {
            thing_id: self.thing_id.clone(),
            external_id: self.external_id.clone(),
            state: self.state,
        }
    }
}

/// Listing filter; unset fields match everything
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigFilter {
    pub state: Option<BootstrapState>,
    /// Case-insensitive substring of the config name
    pub name: Option<String>,
}

impl ConfigFilter {
    pub fn matches(&self, config: &BootstrapConfig) -> bool {
        if let Some(state) = self.state {
            if config.state != state {
                return false;
            }
        }
        match &self.name {
            Some(name) => config
                .name
                .to_lowercase()
                .contains(&name.to_lowercase()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigsPage {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub configs: Vec<BootstrapConfig>,
}

/// A device that attempted a handshake with no matching config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownDevice {
    pub external_id: String,
    pub external_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnknownPage {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub devices: Vec<UnknownDevice>,
}
