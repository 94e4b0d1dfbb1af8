use crate::domain::{BootstrapEventHandler, BootstrapService};
use crate::nats::HandshakeService;
use common::nats::{EventConsumerSettings, JetStreamConsumer, LifecycleEventConsumer, RequestReplyServer};
use common::process::RunnerProcess;
use std::sync::Arc;
use tracing::debug;

pub struct BootstrapModuleConfig {
    pub events: EventConsumerSettings,
    pub handshake_subject: String,
    pub handshake_queue_group: String,
}

/// Bootstrap wiring: a lifecycle consumer keeping configs current and the
/// device handshake endpoint
pub struct Bootstrap {
    event_consumer: LifecycleEventConsumer,
    handshake_server: RequestReplyServer<HandshakeService>,
}

impl Bootstrap {
    pub async fn new(
        service: Arc<BootstrapService>,
        jetstream: Arc<dyn JetStreamConsumer>,
        nats_client: async_nats::Client,
        config: BootstrapModuleConfig,
    ) -> anyhow::Result<Self> {
        debug!("initializing bootstrap module");

        let handler = Arc::new(BootstrapEventHandler::new(Arc::clone(&service)));
        let event_consumer = LifecycleEventConsumer::new(jetstream, config.events, handler).await?;

        let handshake_server = RequestReplyServer::new(
            nats_client,
            config.handshake_subject,
            config.handshake_queue_group,
            HandshakeService::new(service),
        );

        Ok(Self {
            event_consumer,
            handshake_server,
        })
    }

    /// The lifecycle consumer and the handshake endpoint, in that order
    pub fn into_runner_processes(self) -> (RunnerProcess, RunnerProcess) {
        let event_consumer = self.event_consumer;
        let events: RunnerProcess =
            Box::new(move |ctx| Box::pin(async move { event_consumer.run(ctx).await }));

        let handshake_server = self.handshake_server;
        let handshake: RunnerProcess =
            Box::new(move |ctx| Box::pin(async move { handshake_server.run(ctx).await }));

        (events, handshake)
    }
}
