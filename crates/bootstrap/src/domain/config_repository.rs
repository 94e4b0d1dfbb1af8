use crate::domain::{BootstrapConfig, ChannelRef, ConfigFilter, ConfigsPage, UnknownPage};
use async_trait::async_trait;
use common::domain::{BootstrapState, DomainResult, Metadata};

/// Store of bootstrap configs, the unknown-device list and the channel
/// mirror.
///
/// Operator operations are scoped by owner. Event-driven operations
/// (`remove_thing`, `update_channel`, `remove_channel`) are idempotent and
/// not scoped.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Persist a new config. Conflicts on a known thing id or a taken
    /// (external id, external key) pair.
    async fn save(&self, config: BootstrapConfig) -> DomainResult<String>;

    async fn retrieve_by_id(&self, owner: &str, thing_id: &str) -> DomainResult<BootstrapConfig>;

    async fn retrieve_all(
        &self,
        owner: &str,
        filter: ConfigFilter,
        offset: usize,
        limit: usize,
    ) -> DomainResult<ConfigsPage>;

    /// Device lookup; both fields must match
    async fn retrieve_by_external_id(
        &self,
        external_id: &str,
        external_key: &str,
    ) -> DomainResult<BootstrapConfig>;

    async fn update(&self, owner: &str, thing_id: &str, name: String, content: String) -> DomainResult<()>;

    async fn update_connections(
        &self,
        owner: &str,
        thing_id: &str,
        channels: Vec<ChannelRef>,
    ) -> DomainResult<()>;

    async fn remove(&self, owner: &str, thing_id: &str) -> DomainResult<()>;

    /// Drop the config of a removed thing, whoever owns it
    async fn remove_thing(&self, thing_id: &str) -> DomainResult<()>;

    async fn change_state(&self, owner: &str, thing_id: &str, state: BootstrapState) -> DomainResult<()>;

    async fn save_unknown(&self, external_id: &str, external_key: &str) -> DomainResult<()>;

    /// Unknown devices, oldest first attempt first
    async fn retrieve_unknown(&self, offset: usize, limit: usize) -> DomainResult<UnknownPage>;

    /// Overwrite the mirrored name and metadata, absent ones becoming empty.
    /// Channels no config references are not tracked
    async fn update_channel(
        &self,
        channel_id: &str,
        name: Option<String>,
        metadata: Option<Metadata>,
    ) -> DomainResult<()>;

    /// Remove the channel from every config and drop its mirror, returning
    /// how many configs referenced it
    async fn remove_channel(&self, channel_id: &str) -> DomainResult<usize>;
}
