use async_trait::async_trait;
use common::domain::{DomainResult, InMemoryKeyValueStore, KeyValueStore};
use std::sync::Arc;

/// Binding between LoRa application ids and channels
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RouteMapRepository: Send + Sync {
    /// Bind an application to a channel, replacing any binding either
    /// side had
    async fn save(&self, app_id: &str, channel_id: &str) -> DomainResult<()>;

    /// Channel uplinks of the application are routed to
    async fn channel(&self, app_id: &str) -> DomainResult<Option<String>>;

    /// Application currently bound to the channel
    async fn app_id(&self, channel_id: &str) -> DomainResult<Option<String>>;

    /// Drop the binding of a channel, returning the application it had
    async fn remove_channel(&self, channel_id: &str) -> DomainResult<Option<String>>;
}

/// Route map kept in two key/value stores, one per direction
pub struct KeyValueRouteMap {
    channels_by_app: Arc<dyn KeyValueStore>,
    apps_by_channel: Arc<dyn KeyValueStore>,
}

impl KeyValueRouteMap {
    pub fn new(
        channels_by_app: Arc<dyn KeyValueStore>,
        apps_by_channel: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            channels_by_app,
            apps_by_channel,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(InMemoryKeyValueStore::new()),
        )
    }
}

#[async_trait]
impl RouteMapRepository for KeyValueRouteMap {
    async fn save(&self, app_id: &str, channel_id: &str) -> DomainResult<()> {
        // The channel moved off another application
        if let Some(previous_app) = self.apps_by_channel.lookup(channel_id).await? {
            if previous_app != app_id {
                self.channels_by_app.delete(&previous_app).await?;
            }
        }
        // Another channel held this application
        if let Some(previous_channel) = self.channels_by_app.lookup(app_id).await? {
            if previous_channel != channel_id {
                self.apps_by_channel.delete(&previous_channel).await?;
            }
        }

        self.channels_by_app.upsert(app_id, channel_id).await?;
        self.apps_by_channel.upsert(channel_id, app_id).await
    }

    async fn channel(&self, app_id: &str) -> DomainResult<Option<String>> {
        self.channels_by_app.lookup(app_id).await
    }

    async fn app_id(&self, channel_id: &str) -> DomainResult<Option<String>> {
        self.apps_by_channel.lookup(channel_id).await
    }

    async fn remove_channel(&self, channel_id: &str) -> DomainResult<Option<String>> {
        let Some(app_id) = self.apps_by_channel.delete(channel_id).await? else {
            return Ok(None);
        };
        // Only drop the forward entry if it still points at this channel
        if self.channels_by_app.lookup(&app_id).await?.as_deref() == Some(channel_id) {
            self.channels_by_app.delete(&app_id).await?;
        }
        Ok(Some(app_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_binds_both_directions() {
        let routes = KeyValueRouteMap::in_memory();

        routes.save("1", "ch-a").await.unwrap();

        assert_eq!(routes.channel("1").await.unwrap().as_deref(), Some("ch-a"));
        assert_eq!(routes.app_id("ch-a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_moving_channel_to_new_app_drops_old_key() {
        let routes = KeyValueRouteMap::in_memory();
        routes.save("1", "ch-a").await.unwrap();

        routes.save("2", "ch-a").await.unwrap();

        assert_eq!(routes.channel("1").await.unwrap(), None);
        assert_eq!(routes.channel("2").await.unwrap().as_deref(), Some("ch-a"));
    }

    #[tokio::test]
    async fn test_rebinding_app_releases_previous_channel() {
        let routes = KeyValueRouteMap::in_memory();
        routes.save("1", "ch-a").await.unwrap();

        routes.save("1", "ch-b").await.unwrap();

        assert_eq!(routes.app_id("ch-a").await.unwrap(), None);
        assert_eq!(routes.remove_channel("ch-a").await.unwrap(), None);
        assert_eq!(routes.channel("1").await.unwrap().as_deref(), Some("ch-b"));
    }

    #[tokio::test]
    async fn test_remove_channel_is_idempotent() {
        let routes = KeyValueRouteMap::in_memory();
        routes.save("1", "ch-a").await.unwrap();

        assert_eq!(routes.remove_channel("ch-a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(routes.remove_channel("ch-a").await.unwrap(), None);
        assert_eq!(routes.channel("1").await.unwrap(), None);
    }
}
