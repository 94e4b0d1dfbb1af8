use crate::domain::{DomainError, DomainResult, LifecycleEvent, LifecycleEventProducer};
use crate::nats::JetStreamPublisher;
use crate::nats::trace_context::inject_trace_context;
use anyhow::Context;
use async_nats::HeaderMap;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Appends lifecycle events to a JetStream stream as flat JSON records,
/// on subject `<stream>.<operation>`
pub struct NatsLifecycleEventProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
    stream_name: String,
}

impl NatsLifecycleEventProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, stream_name: impl Into<String>) -> Self {
        Self {
            jetstream,
            stream_name: stream_name.into(),
        }
    }
}

#[async_trait]
impl LifecycleEventProducer for NatsLifecycleEventProducer {
    async fn publish_event(&self, event: &LifecycleEvent) -> DomainResult<()> {
        let subject = format!("{}.{}", self.stream_name, event.operation());
        let payload = serde_json::to_vec(&event.to_record())
            .context("Failed to encode lifecycle record")
            .map_err(DomainError::RepositoryError)?;

        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        debug!(subject = %subject, entity_id = %event.entity_id(), "Appending lifecycle event");

        self.jetstream
            .publish(subject, headers, payload.into())
            .await
            .context("Failed to append lifecycle event")
            .map_err(DomainError::RepositoryError)
    }
}
