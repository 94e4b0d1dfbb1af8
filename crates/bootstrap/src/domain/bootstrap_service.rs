use crate::domain::{
    BootstrapConfig, ChannelRef, ConfigFilter, ConfigRepository, ConfigsPage, UnknownPage,
};
use async_trait::async_trait;
use common::domain::{
    BootstrapClient, BootstrapRequest, BootstrapState, BootstrapSummary, CreateThingInput,
    DomainError, DomainResult, IdentityProvider, Metadata, ThingsRegistry, bounded,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Bootstrap operations for operators, devices and the lifecycle log.
///
/// Operator calls authenticate their token and act on configs of that
/// owner only. Every registry call is bounded by the request timeout.
pub struct BootstrapService {
    repository: Arc<dyn ConfigRepository>,
    identity: Arc<dyn IdentityProvider>,
    registry: Arc<dyn ThingsRegistry>,
    request_timeout: Duration,
}

impl BootstrapService {
    pub fn new(
        repository: Arc<dyn ConfigRepository>,
        identity: Arc<dyn IdentityProvider>,
        registry: Arc<dyn ThingsRegistry>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            identity,
            registry,
            request_timeout,
        }
    }

    async fn bounded<T>(&self, call: impl Future<Output = DomainResult<T>>) -> DomainResult<T> {
        bounded(self.request_timeout, call).await
    }

    async fn owner(&self, token: &str) -> DomainResult<String> {
        self.bounded(self.identity.identify(token)).await
    }

    async fn resolve_channels(&self, token: &str, channel_ids: &[String]) -> DomainResult<Vec<ChannelRef>> {
        let mut channels = Vec::with_capacity(channel_ids.len());
        for id in channel_ids {
            let channel = self.bounded(self.registry.view_channel(token, id)).await?;
            channels.push(ChannelRef {
                id: channel.id,
                name: channel.name,
                metadata: channel.metadata,
            });
        }
        Ok(channels)
    }

    /// Register a config, creating its thing in the registry when the
    /// request names none
    #[instrument(skip(self, token, request), fields(external_id = %request.external_id))]
    pub async fn add(&self, token: &str, request: BootstrapRequest) -> DomainResult<BootstrapConfig> {
        let owner = self.owner(token).await?;

        if request.external_id.is_empty() || request.external_key.is_empty() {
            return Err(DomainError::ValidationError(
                "external id and external key are required".to_string(),
            ));
        }

        let (thing_id, created) = match &request.thing_id {
            Some(id) => (id.clone(), false),
            None => {
                let input = CreateThingInput {
                    name: request.name.clone(),
                    metadata: Metadata::new(),
                };
                (self.bounded(self.registry.create_thing(token, input)).await?, true)
            }
        };

        match self.register(token, &owner, &thing_id, request).await {
            Ok(config) => {
                info!(thing_id = %config.thing_id, owner = %owner, "bootstrap config added");
                Ok(config)
            }
            Err(e) => {
                if created {
                    if let Err(cleanup) = self.bounded(self.registry.delete_thing(token, &thing_id)).await {
                        warn!(thing_id = %thing_id, error = %cleanup, "failed to remove thing of rejected config");
                    }
                }
                Err(e)
            }
        }
    }

    async fn register(
        &self,
        token: &str,
        owner: &str,
        thing_id: &str,
        request: BootstrapRequest,
    ) -> DomainResult<BootstrapConfig> {
        let thing = self.bounded(self.registry.view_thing(token, thing_id)).await?;
        let channels = self.resolve_channels(token, &request.channels).await?;

        let config = BootstrapConfig {
            thing_id: thing.id,
            owner: owner.to_string(),
            name: request.name,
            thing_key: thing.key,
            channels,
            external_id: request.external_id,
            external_key: request.external_key,
            content: request.content,
            client_cert: request.client_cert,
            client_key: request.client_key,
            ca_cert: request.ca_cert,
            state: BootstrapState::Inactive,
        };

        self.repository.save(config.clone()).await?;
        Ok(config)
    }

    pub async fn view(&self, token: &str, thing_id: &str) -> DomainResult<BootstrapConfig> {
        let owner = self.owner(token).await?;
        self.repository.retrieve_by_id(&owner, thing_id).await
    }

    pub async fn list(
        &self,
        token: &str,
        filter: ConfigFilter,
        offset: usize,
        limit: usize,
    ) -> DomainResult<ConfigsPage> {
        let owner = self.owner(token).await?;
        self.repository.retrieve_all(&owner, filter, offset, limit).await
    }

    #[instrument(skip(self, token, content))]
    pub async fn update(&self, token: &str, thing_id: &str, name: String, content: String) -> DomainResult<()> {
        let owner = self.owner(token).await?;
        self.repository.update(&owner, thing_id, name, content).await
    }

    /// Replace the channel list of a config. An active thing is connected
    /// to added channels and disconnected from dropped ones.
    #[instrument(skip(self, token, channel_ids))]
    pub async fn update_connections(
        &self,
        token: &str,
        thing_id: &str,
        channel_ids: Vec<String>,
    ) -> DomainResult<()> {
        let owner = self.owner(token).await?;
        let current = self.repository.retrieve_by_id(&owner, thing_id).await?;
        let channels = self.resolve_channels(token, &channel_ids).await?;

        if current.state == BootstrapState::Active {
            let existing = current.channel_ids();
            for added in channel_ids.iter().filter(|id| !existing.contains(id)) {
                self.bounded(self.registry.connect(token, added, thing_id)).await?;
            }
            for dropped in existing.iter().filter(|id| !channel_ids.contains(id)) {
                self.disconnect(token, dropped, thing_id).await?;
            }
        }

        self.repository
            .update_connections(&owner, thing_id, channels)
            .await
    }

    #[instrument(skip(self, token))]
    pub async fn remove(&self, token: &str, thing_id: &str) -> DomainResult<()> {
        let owner = self.owner(token).await?;
        self.repository.remove(&owner, thing_id).await?;
        info!(thing_id = %thing_id, "bootstrap config removed");
        Ok(())
    }

    /// Move a config between Inactive and Active, connecting or
    /// disconnecting its thing in the registry first
    #[instrument(skip(self, token, state), fields(state = %state))]
    pub async fn change_state(&self, token: &str, thing_id: &str, state: BootstrapState) -> DomainResult<()> {
        let owner = self.owner(token).await?;
        let config = self.repository.retrieve_by_id(&owner, thing_id).await?;

        if config.state == state {
            debug!(thing_id = %thing_id, "state unchanged");
            return Ok(());
        }

        for channel in &config.channels {
            match state {
                BootstrapState::Active => {
                    self.bounded(self.registry.connect(token, &channel.id, thing_id))
                        .await?
                }
                BootstrapState::Inactive => self.disconnect(token, &channel.id, thing_id).await?,
            }
        }

        self.repository.change_state(&owner, thing_id, state).await?;
        info!(thing_id = %thing_id, "bootstrap state changed");
        Ok(())
    }

    async fn disconnect(&self, token: &str, channel_id: &str, thing_id: &str) -> DomainResult<()> {
        match self
            .bounded(self.registry.disconnect(token, channel_id, thing_id))
            .await
        {
            // Already gone in the registry
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Device handshake. A miss is recorded in the unknown list and
    /// reported as not found.
    #[instrument(skip(self, external_key))]
    pub async fn bootstrap(&self, external_id: &str, external_key: &str) -> DomainResult<BootstrapConfig> {
        match self
            .repository
            .retrieve_by_external_id(external_id, external_key)
            .await
        {
            Ok(config) => {
                debug!(thing_id = %config.thing_id, "device bootstrapped");
                Ok(config)
            }
            Err(e) if e.is_not_found() => {
                if let Err(save_err) = self.repository.save_unknown(external_id, external_key).await {
                    warn!(error = %save_err, "failed to record unknown device");
                }
                info!(external_id = %external_id, "handshake from unknown device");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_unknown(&self, token: &str, offset: usize, limit: usize) -> DomainResult<UnknownPage> {
        self.owner(token).await?;
        self.repository.retrieve_unknown(offset, limit).await
    }

    /// A thing was removed from the registry
    pub async fn remove_thing(&self, thing_id: &str) -> DomainResult<()> {
        self.repository.remove_thing(thing_id).await
    }

    /// A channel changed in the registry
    pub async fn update_channel(
        &self,
        channel_id: &str,
        name: Option<String>,
        metadata: Option<Metadata>,
    ) -> DomainResult<()> {
        self.repository.update_channel(channel_id, name, metadata).await
    }

    /// A channel was removed from the registry
    pub async fn remove_channel(&self, channel_id: &str) -> DomainResult<()> {
        let touched = self.repository.remove_channel(channel_id).await?;
        debug!(channel_id = %channel_id, configs = touched, "channel removed from configs");
        Ok(())
    }
}

#[async_trait]
impl BootstrapClient for BootstrapService {
    async fn add_config(&self, token: &str, request: BootstrapRequest) -> DomainResult<String> {
        self.add(token, request).await.map(|config| config.thing_id)
    }

    async fn view_config(&self, token: &str, thing_id: &str) -> DomainResult<BootstrapSummary> {
        self.view(token, thing_id).await.map(|config| config.summary())
    }

    async fn remove_config(&self, token: &str, thing_id: &str) -> DomainResult<()> {
        self.remove(token, thing_id).await
    }

    async fn change_state(
        &self,
        token: &str,
        thing_id: &str,
        state: BootstrapState,
    ) -> DomainResult<()> {
        BootstrapService::change_state(self, token, thing_id, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InMemoryConfigRepository;
    use common::domain::{Channel, MockIdentityProvider, MockThingsRegistry, Thing};
    use mockall::predicate::eq;

    const OWNER: &str = "alice@example.com";

    fn identity() -> Arc<MockIdentityProvider> {
        let mut identity = MockIdentityProvider::new();
        identity.expect_identify().returning(|token| match token {
            "token" => Ok(OWNER.to_string()),
            _ => Err(DomainError::Unauthorized("invalid token".into())),
        });
        Arc::new(identity)
    }

    fn registry_with_things() -> MockThingsRegistry {
        let mut registry = MockThingsRegistry::new();
        registry.expect_view_thing().returning(|_, id| {
            Ok(Thing {
                id: id.to_string(),
                key: format!("key-{}", id),
                ..Default::default()
            })
        });
        registry.expect_view_channel().returning(|_, id| {
            Ok(Channel {
                id: id.to_string(),
                name: format!("channel {}", id),
                ..Default::default()
            })
        });
        registry
    }

    fn service(repo: Arc<InMemoryConfigRepository>, registry: MockThingsRegistry) -> BootstrapService {
        BootstrapService::new(repo, identity(), Arc::new(registry), Duration::from_secs(1))
    }

    fn request(thing_id: Option<&str>, channels: &[&str]) -> BootstrapRequest {
        BootstrapRequest {
            thing_id: thing_id.map(String::from),
            external_id: "ext-1".into(),
            external_key: "ext-key".into(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
            name: "gateway".into(),
            content: "{\"interval\": 30}".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_creates_thing_when_missing() {
        let mut registry = registry_with_things();
        registry
            .expect_create_thing()
            .withf(|_, input: &CreateThingInput| input.name == "gateway")
            .times(1)
            .returning(|_, _| Ok("th-new".to_string()));

        let repo = Arc::new(InMemoryConfigRepository::new());
        let svc = service(repo.clone(), registry);

        let config = svc.add("token", request(None, &["ch-1"])).await.unwrap();

        assert_eq!(config.thing_id, "th-new");
        assert_eq!(config.thing_key, "key-th-new");
        assert_eq!(config.owner, OWNER);
        assert_eq!(config.state, BootstrapState::Inactive);
        assert_eq!(config.channels[0].name, "channel ch-1");
        assert_eq!(repo.channel("ch-1").await.unwrap().name, "channel ch-1");
    }

    #[tokio::test]
    async fn test_add_rolls_back_created_thing_when_channel_is_missing() {
        let mut registry = MockThingsRegistry::new();
        registry
            .expect_create_thing()
            .returning(|_, _| Ok("th-new".to_string()));
        registry.expect_view_thing().returning(|_, id| {
            Ok(Thing {
                id: id.to_string(),
                ..Default::default()
            })
        });
        registry
            .expect_view_channel()
            .returning(|_, id| Err(DomainError::EntityNotFound(id.to_string())));
        registry
            .expect_delete_thing()
            .with(eq("token"), eq("th-new"))
            .times(1)
            .returning(|_, _| Ok(()));

        let svc = service(Arc::new(InMemoryConfigRepository::new()), registry);

        assert!(matches!(
            svc.add("token", request(None, &["ch-404"])).await,
            Err(DomainError::EntityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_requires_valid_token() {
        let mut registry = MockThingsRegistry::new();
        registry.expect_create_thing().never();
        let svc = service(Arc::new(InMemoryConfigRepository::new()), registry);

        assert!(matches!(
            svc.add("forged", request(None, &[])).await,
            Err(DomainError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_change_state_connects_then_disconnects() {
        let mut registry = registry_with_things();
        registry
            .expect_connect()
            .times(2)
            .returning(|_, _, _| Ok(()));
        registry
            .expect_disconnect()
            .with(eq("token"), eq("ch-2"), eq("th-1"))
            .times(1)
            .returning(|_, _, _| Err(DomainError::EntityNotFound("connection".into())));
        registry
            .expect_disconnect()
            .with(eq("token"), eq("ch-1"), eq("th-1"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let repo = Arc::new(InMemoryConfigRepository::new());
        let svc = service(repo, registry);
        svc.add("token", request(Some("th-1"), &["ch-1", "ch-2"]))
            .await
            .unwrap();

        svc.change_state("token", "th-1", BootstrapState::Active)
            .await
            .unwrap();
        // Repeating the same state makes no registry calls
        svc.change_state("token", "th-1", BootstrapState::Active)
            .await
            .unwrap();
        assert_eq!(
            svc.view("token", "th-1").await.unwrap().state,
            BootstrapState::Active
        );

        svc.change_state("token", "th-1", BootstrapState::Inactive)
            .await
            .unwrap();
        assert_eq!(
            svc.view("token", "th-1").await.unwrap().state,
            BootstrapState::Inactive
        );
    }

    #[tokio::test]
    async fn test_change_state_of_missing_config_is_not_found() {
        let svc = service(Arc::new(InMemoryConfigRepository::new()), MockThingsRegistry::new());

        assert!(matches!(
            svc.change_state("token", "th-404", BootstrapState::Active).await,
            Err(DomainError::ConfigNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_connections_of_active_config() {
        let mut registry = registry_with_things();
        registry
            .expect_connect()
            .with(eq("token"), eq("ch-1"), eq("th-1"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        registry
            .expect_connect()
            .with(eq("token"), eq("ch-3"), eq("th-1"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        registry
            .expect_disconnect()
            .with(eq("token"), eq("ch-1"), eq("th-1"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let svc = service(Arc::new(InMemoryConfigRepository::new()), registry);
        svc.add("token", request(Some("th-1"), &["ch-1"])).await.unwrap();
        svc.change_state("token", "th-1", BootstrapState::Active)
            .await
            .unwrap();

        svc.update_connections("token", "th-1", vec!["ch-3".into()])
            .await
            .unwrap();

        let config = svc.view("token", "th-1").await.unwrap();
        assert_eq!(config.channel_ids(), vec!["ch-3".to_string()]);
    }

    #[tokio::test]
    async fn test_bootstrap_miss_records_unknown_device() {
        let svc = service(Arc::new(InMemoryConfigRepository::new()), registry_with_things());
        svc.add("token", request(Some("th-1"), &[])).await.unwrap();

        let config = svc.bootstrap("ext-1", "ext-key").await.unwrap();
        assert_eq!(config.thing_key, "key-th-1");

        assert!(matches!(
            svc.bootstrap("ext-1", "stolen-id-wrong-key").await,
            Err(DomainError::ConfigNotFound(_))
        ));

        let unknown = svc.list_unknown("token", 0, 10).await.unwrap();
        assert_eq!(unknown.total, 1);
        assert_eq!(unknown.devices[0].external_key, "stolen-id-wrong-key");
    }

    #[tokio::test]
    async fn test_registry_timeout_is_unavailable() {
        struct SlowIdentity;

        #[async_trait]
        impl IdentityProvider for SlowIdentity {
            async fn identify(&self, _token: &str) -> DomainResult<String> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(OWNER.to_string())
            }
        }

        let svc = BootstrapService::new(
            Arc::new(InMemoryConfigRepository::new()),
            Arc::new(SlowIdentity),
            Arc::new(MockThingsRegistry::new()),
            Duration::from_millis(10),
        );

        assert!(matches!(
            svc.view("token", "th-1").await,
            Err(DomainError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_client_view_returns_summary() {
        let svc = service(Arc::new(InMemoryConfigRepository::new()), registry_with_things());
        let client: &dyn BootstrapClient = &svc;

        let thing_id = client
            .add_config("token", request(Some("th-1"), &[]))
            .await
            .unwrap();
        let summary = client.view_config("token", &thing_id).await.unwrap();

        assert_eq!(
            summary,
            BootstrapSummary {
                thing_id: "th-1".into(),
                external_id: "ext-1".into(),
                state: BootstrapState::Inactive,
            }
        );
    }
}
