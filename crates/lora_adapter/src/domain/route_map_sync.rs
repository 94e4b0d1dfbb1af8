use crate::domain::RouteMapRepository;
use async_trait::async_trait;
use common::domain::{DomainResult, LifecycleEvent, LifecycleEventHandler, Metadata};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Metadata key holding the LoRa binding of a channel
pub const LORA_METADATA_KEY: &str = "lora";
const APP_ID_KEY: &str = "app_id";

/// LoRa application id declared in channel metadata
/// (`{"lora": {"app_id": "<id>"}}`); numeric ids are accepted
pub fn lora_app_id(metadata: &Metadata) -> Option<String> {
    match metadata.get(LORA_METADATA_KEY)?.get(APP_ID_KEY)? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Keeps the route map in sync with channel lifecycle events
pub struct RouteMapSyncHandler {
    route_map: Arc<dyn RouteMapRepository>,
}

impl RouteMapSyncHandler {
    pub fn new(route_map: Arc<dyn RouteMapRepository>) -> Self {
        Self { route_map }
    }

    async fn sync_channel(&self, channel_id: &str, metadata: Option<&Metadata>) -> DomainResult<()> {
        match metadata.and_then(lora_app_id) {
            Some(app_id) => {
                self.route_map.save(&app_id, channel_id).await?;
                info!(channel_id = %channel_id, app_id = %app_id, "route saved");
            }
            None => {
                if let Some(app_id) = self.route_map.remove_channel(channel_id).await? {
                    info!(channel_id = %channel_id, app_id = %app_id, "route removed, channel no longer bound to LoRa");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleEventHandler for RouteMapSyncHandler {
    #[instrument(skip(self, event), fields(operation = event.operation(), entity_id = %event.entity_id()))]
    async fn handle(&self, event: LifecycleEvent) -> DomainResult<()> {
        match event {
            LifecycleEvent::ChannelCreated { id, metadata, .. } => {
                // A new channel without LoRa metadata has nothing to undo
                if let Some(app_id) = metadata.as_ref().and_then(lora_app_id) {
                    self.route_map.save(&app_id, &id).await?;
                    info!(channel_id = %id, app_id = %app_id, "route saved");
                }
                Ok(())
            }
            LifecycleEvent::ChannelUpdated { id, metadata, .. } => {
                self.sync_channel(&id, metadata.as_ref()).await
            }
            LifecycleEvent::ChannelRemoved { id } => {
                if let Some(app_id) = self.route_map.remove_channel(&id).await? {
                    info!(channel_id = %id, app_id = %app_id, "route removed");
                }
                Ok(())
            }
            other => {
                debug!(operation = other.operation(), "event does not affect routes");
                Ok(())
            }
        }
    }
}
