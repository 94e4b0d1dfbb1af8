use crate::domain::{
    BootstrapConfig, ChannelRef, ConfigFilter, ConfigRepository, ConfigsPage, UnknownDevice,
    UnknownPage,
};
use async_trait::async_trait;
use common::domain::{BootstrapState, DomainError, DomainResult, Metadata};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct ConfigState {
    /// Keyed by thing id. Channel entries hold ids; attributes come from
    /// the mirror.
    configs: BTreeMap<String, BootstrapConfig>,
    by_external: HashMap<(String, String), String>,
    unknown: Vec<UnknownDevice>,
    channels: HashMap<String, ChannelRef>,
}

impl ConfigState {
    fn owned_mut(&mut self, owner: &str, thing_id: &str) -> DomainResult<&mut BootstrapConfig> {
        self.configs
            .get_mut(thing_id)
            .filter(|c| c.owner == owner)
            .ok_or_else(|| DomainError::ConfigNotFound(thing_id.to_string()))
    }

    fn mirror(&mut self, channels: &[ChannelRef]) {
        for channel in channels {
            self.channels.insert(channel.id.clone(), channel.clone());
        }
    }

    /// Config with its channel list resolved against the mirror
    fn materialize(&self, config: &BootstrapConfig) -> BootstrapConfig {
        let mut config = config.clone();
        for channel in config.channels.iter_mut() {
            if let Some(mirrored) = self.channels.get(&channel.id) {
                *channel = mirrored.clone();
            }
        }
        config
    }

    fn drop_config(&mut self, thing_id: &str) -> Option<BootstrapConfig> {
        let config = self.configs.remove(thing_id)?;
        self.by_external
            .remove(&(config.external_id.clone(), config.external_key.clone()));
        Some(config)
    }

    /// Forget mirrored channels no config references any more
    fn prune_mirror(&mut self) {
        let referenced: HashSet<&str> = self
            .configs
            .values()
            .flat_map(|c| c.channels.iter().map(|ch| ch.id.as_str()))
            .collect();
        self.channels.retain(|id, _| referenced.contains(id.as_str()));
    }
}

/// Config repository held in process memory behind a single lock
#[derive(Clone, Default)]
pub struct InMemoryConfigRepository {
    state: Arc<RwLock<ConfigState>>,
}

impl InMemoryConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrored attributes of a channel
    pub async fn channel(&self, channel_id: &str) -> Option<ChannelRef> {
        self.state.read().await.channels.get(channel_id).cloned()
    }
}

#[async_trait]
impl ConfigRepository for InMemoryConfigRepository {
    async fn save(&self, config: BootstrapConfig) -> DomainResult<String> {
        let mut state = self.state.write().await;

        if state.configs.contains_key(&config.thing_id) {
            return Err(DomainError::ConfigAlreadyExists(config.thing_id));
        }
        let external = (config.external_id.clone(), config.external_key.clone());
        if state.by_external.contains_key(&external) {
            return Err(DomainError::Conflict(format!(
                "external id {} is already bound",
                config.external_id
            )));
        }

        state
            .unknown
            .retain(|d| d.external_id != external.0 || d.external_key != external.1);
        state.mirror(&config.channels);
        state.by_external.insert(external, config.thing_id.clone());

        let thing_id = config.thing_id.clone();
        state.configs.insert(thing_id.clone(), config);
        Ok(thing_id)
    }

    async fn retrieve_by_id(&self, owner: &str, thing_id: &str) -> DomainResult<BootstrapConfig> {
        let state = self.state.read().await;
        state
            .configs
            .get(thing_id)
            .filter(|c| c.owner == owner)
            .map(|c| state.materialize(c))
            .ok_or_else(|| DomainError::ConfigNotFound(thing_id.to_string()))
    }

    async fn retrieve_all(
        &self,
        owner: &str,
        filter: ConfigFilter,
        offset: usize,
        limit: usize,
    ) -> DomainResult<ConfigsPage> {
        let state = self.state.read().await;
        let matching: Vec<&BootstrapConfig> = state
            .configs
            .values()
            .filter(|c| c.owner == owner && filter.matches(c))
            .collect();

        Ok(ConfigsPage {
            total: matching.len(),
            offset,
            limit,
            configs: matching
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|c| state.materialize(c))
                .collect(),
        })
    }

    async fn retrieve_by_external_id(
        &self,
        external_id: &str,
        external_key: &str,
    ) -> DomainResult<BootstrapConfig> {
        let state = self.state.read().await;
        state
            .by_external
            .get(&(external_id.to_string(), external_key.to_string()))
            .and_then(|thing_id| state.configs.get(thing_id))
            .map(|c| state.materialize(c))
            .ok_or_else(|| DomainError::ConfigNotFound(external_id.to_string()))
    }

    async fn update(&self, owner: &str, thing_id: &str, name: String, content: String) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let config = state.owned_mut(owner, thing_id)?;
        config.name = name;
        config.content = content;
        Ok(())
    }

    async fn update_connections(
        &self,
        owner: &str,
        thing_id: &str,
        channels: Vec<ChannelRef>,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.owned_mut(owner, thing_id)?;
        state.mirror(&channels);
        state.owned_mut(owner, thing_id)?.channels = channels;
        state.prune_mirror();
        Ok(())
    }

    async fn remove(&self, owner: &str, thing_id: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        if state.configs.get(thing_id).is_some_and(|c| c.owner == owner) {
            state.drop_config(thing_id);
            state.prune_mirror();
        }
        Ok(())
    }

    async fn remove_thing(&self, thing_id: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        if state.drop_config(thing_id).is_some() {
            state.prune_mirror();
        }
        Ok(())
    }

    async fn change_state(&self, owner: &str, thing_id: &str, new_state: BootstrapState) -> DomainResult<()> {
        let mut state = self.state.write().await;
        state.owned_mut(owner, thing_id)?.state = new_state;
        Ok(())
    }

    async fn save_unknown(&self, external_id: &str, external_key: &str) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let known = state
            .unknown
            .iter()
            .any(|d| d.external_id == external_id && d.external_key == external_key);
        if !known {
            state.unknown.push(UnknownDevice {
                external_id: external_id.to_string(),
                external_key: external_key.to_string(),
            });
        }
        Ok(())
    }

    async fn retrieve_unknown(&self, offset: usize, limit: usize) -> DomainResult<UnknownPage> {
        let state = self.state.read().await;
        Ok(UnknownPage {
            total: state.unknown.len(),
            offset,
            limit,
            devices: state.unknown.iter().skip(offset).take(limit).cloned().collect(),
        })
    }

    async fn update_channel(
        &self,
        channel_id: &str,
        name: Option<String>,
        metadata: Option<Metadata>,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        // An update event carries the whole channel; absent fields clear
        if let Some(channel) = state.channels.get_mut(channel_id) {
            channel.name = name.unwrap_or_default();
            channel.metadata = metadata.unwrap_or_default();
        }
        Ok(())
    }

    async fn remove_channel(&self, channel_id: &str) -> DomainResult<usize> {
        let mut state = self.state.write().await;
        state.channels.remove(channel_id);

        let mut touched = 0;
        for config in state.configs.values_mut() {
            let before = config.channels.len();
            config.channels.retain(|c| c.id != channel_id);
            if config.channels.len() != before {
                touched += 1;
            }
        }
        Ok(touched)
    }
}
