use crate::domain::{LoraMessageRouter, RouteMapRepository, RouteMapSyncHandler};
use crate::mqtt::{MqttSubscriberConfig, run_mqtt_subscriber};
use common::domain::MessagePublisher;
use common::nats::{EventConsumerSettings, JetStreamConsumer, LifecycleEventConsumer};
use common::process::RunnerProcess;
use std::sync::Arc;
use tracing::debug;

pub struct LoraAdapterConfig {
    /// Channel lifecycle events keeping the route map current
    pub events: EventConsumerSettings,
    pub mqtt: MqttSubscriberConfig,
}

/// The LoRa adapter: a lifecycle consumer writing the route map and an MQTT
/// ingress reading it
pub struct LoraAdapter {
    event_consumer: LifecycleEventConsumer,
    router: Arc<LoraMessageRouter>,
    mqtt_config: MqttSubscriberConfig,
}

impl LoraAdapter {
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        route_map: Arc<dyn RouteMapRepository>,
        publisher: Arc<dyn MessagePublisher>,
        config: LoraAdapterConfig,
    ) -> anyhow::Result<Self> {
        debug!("initializing LoRa adapter module");

        let handler = Arc::new(RouteMapSyncHandler::new(Arc::clone(&route_map)));
        let event_consumer = LifecycleEventConsumer::new(jetstream, config.events, handler).await?;
        let router = Arc::new(LoraMessageRouter::new(route_map, publisher));

        Ok(Self {
            event_consumer,
            router,
            mqtt_config: config.mqtt,
        })
    }

    /// The lifecycle consumer and the MQTT subscriber, in that order
    pub fn into_runner_processes(self) -> (RunnerProcess, RunnerProcess) {
        let event_consumer = self.event_consumer;
        let events: RunnerProcess =
            Box::new(move |ctx| Box::pin(async move { event_consumer.run(ctx).await }));

        let router = self.router;
        let mqtt_config = self.mqtt_config;
        let uplinks: RunnerProcess = Box::new(move |ctx| {
            Box::pin(async move { run_mqtt_subscriber(mqtt_config, router, ctx).await })
        });

        (events, uplinks)
    }
}
