use crate::domain::BootstrapService;
use async_trait::async_trait;
use common::domain::{DomainResult, LifecycleEvent, LifecycleEventHandler};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Applies registry lifecycle events to the bootstrap store
pub struct BootstrapEventHandler {
    service: Arc<BootstrapService>,
}

impl BootstrapEventHandler {
    pub fn new(service: Arc<BootstrapService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LifecycleEventHandler for BootstrapEventHandler {
    #[instrument(skip(self, event), fields(operation = event.operation(), entity_id = %event.entity_id()))]
    async fn handle(&self, event: LifecycleEvent) -> DomainResult<()> {
        match event {
            LifecycleEvent::ThingRemoved { id } => self.service.remove_thing(&id).await,
            LifecycleEvent::ChannelUpdated { id, name, metadata } => {
                self.service.update_channel(&id, name, metadata).await
            }
            LifecycleEvent::ChannelRemoved { id } => self.service.remove_channel(&id).await,
            other => {
                debug!(operation = other.operation(), "event not relevant to bootstrap");
                Ok(())
            }
        }
    }
}
