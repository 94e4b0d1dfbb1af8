use crate::domain::LifecycleEventHandler;
use crate::nats::{
    EventConsumerSettings, EventStreamConsumer, JetStreamConsumer, LifecycleEventService,
    NatsConsumeLoggingLayer, NatsConsumeLoggingService, NatsConsumeTracingLayer,
    NatsConsumeTracingService,
};
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::debug;

type LifecycleLayeredService = NatsConsumeTracingService<
    NatsConsumeLoggingService<LifecycleEventService<dyn LifecycleEventHandler>>,
>;

/// Event stream consumer feeding a lifecycle handler through the consume
/// tracing and logging middleware
pub struct LifecycleEventConsumer {
    consumer: EventStreamConsumer<LifecycleLayeredService>,
}

impl LifecycleEventConsumer {
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        settings: EventConsumerSettings,
        handler: Arc<dyn LifecycleEventHandler>,
    ) -> Result<Self> {
        debug!(
            stream = %settings.stream_name,
            group = %settings.group_name,
            "initializing lifecycle event consumer with Tower middleware"
        );

        let service = ServiceBuilder::new()
            .layer(NatsConsumeTracingLayer::new(
                settings.stream_name.clone(),
                settings.group_name.clone(),
            ))
            .layer(NatsConsumeLoggingLayer::new(settings.instance_name.clone()))
            .service(LifecycleEventService::new(handler));

        let consumer = EventStreamConsumer::new(jetstream, settings, service).await?;

        Ok(Self { consumer })
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        self.consumer.run(ctx).await
    }
}
