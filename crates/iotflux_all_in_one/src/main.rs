mod config;

use bootstrap::{Bootstrap, BootstrapModuleConfig, BootstrapService, InMemoryConfigRepository};
use common::nats::{EventConsumerSettings, NatsClient, NatsMessageProducer, PollBackoff};
use common::sdk::{HttpCertsClient, HttpThingsRegistry, HttpUsersClient, SdkConfig};
use common::telemetry::{TelemetryConfig, TelemetryProviders, init_telemetry, shutdown_telemetry};
use crate::config::ServiceConfig;
use iotflux_runner::Runner;
use lora_adapter::{KeyValueRouteMap, LoraAdapter, LoraAdapterConfig, MqttSubscriberConfig};
use provision::{Provision, ProvisionProfile, ProvisionService};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting iotflux-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let nats_client = match initialize_nats(&config).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to initialize NATS: {:#}", e);
            std::process::exit(1);
        }
    };

    let provision_profile = match ProvisionProfile::load(&config.provision_config_path) {
        Ok(profile) => profile,
        Err(e) => {
            error!(
                path = %config.provision_config_path,
                "Failed to load provisioning profile: {}", e
            );
            std::process::exit(1);
        }
    };

    let collaborators = match Collaborators::new(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build collaborator clients: {:#}", e);
            std::process::exit(1);
        }
    };
    let request_timeout = Duration::from_millis(config.request_timeout_ms);

    // Domain services
    let bootstrap_service = Arc::new(BootstrapService::new(
        Arc::new(InMemoryConfigRepository::new()),
        collaborators.users.clone(),
        collaborators.things.clone(),
        request_timeout,
    ));
    let provision_service = Arc::new(ProvisionService::new(
        provision_profile,
        collaborators.things.clone(),
        collaborators.users.clone(),
        collaborators.certs.clone(),
        bootstrap_service.clone(),
        request_timeout,
    ));

    // Modules
    let lora_adapter = match LoraAdapter::new(
        nats_client.create_consumer_client(),
        Arc::new(KeyValueRouteMap::in_memory()),
        Arc::new(NatsMessageProducer::new(
            nats_client.create_publisher_client(),
        )),
        LoraAdapterConfig {
            events: event_settings(&config, &config.lora_consumer_group),
            mqtt: MqttSubscriberConfig {
                broker_url: config.lora_mqtt_url.clone(),
                client_id: config.lora_mqtt_client_id.clone(),
                topic: config.lora_mqtt_topic.clone(),
                max_retry_attempts: config.lora_mqtt_max_retry_attempts,
                retry_delay: Duration::from_secs(config.lora_mqtt_retry_delay_secs),
            },
        },
    )
    .await
    {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to initialize LoRa adapter: {:#}", e);
            std::process::exit(1);
        }
    };

    let bootstrap = match Bootstrap::new(
        bootstrap_service,
        nats_client.create_consumer_client(),
        nats_client.client(),
        BootstrapModuleConfig {
            events: event_settings(&config, &config.bootstrap_consumer_group),
            handshake_subject: config.handshake_subject.clone(),
            handshake_queue_group: config.handshake_queue_group.clone(),
        },
    )
    .await
    {
        Ok(module) => module,
        Err(e) => {
            error!("Failed to initialize bootstrap: {:#}", e);
            std::process::exit(1);
        }
    };

    let provision = Provision::new(
        provision_service,
        nats_client.client(),
        config.provision_subject.clone(),
        config.provision_queue_group.clone(),
    );

    let (lora_events, lora_uplinks) = lora_adapter.into_runner_processes();
    let (bootstrap_events, bootstrap_handshake) = bootstrap.into_runner_processes();

    let runner = Runner::new()
        .with_named_process("lora_adapter_events", lora_events)
        .with_named_process("lora_adapter_mqtt", lora_uplinks)
        .with_named_process("bootstrap_events", bootstrap_events)
        .with_named_process("bootstrap_handshake", bootstrap_handshake)
        .with_named_process("provision", provision.into_runner_process())
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");
                match Arc::try_unwrap(nats_client) {
                    Ok(client) => {
                        if let Err(e) = client.close().await {
                            error!("Failed to close NATS connection: {:#}", e);
                        }
                    }
                    Err(_) => debug!("NATS client still shared, dropping without flush"),
                }

                // Flush pending traces and logs
                shutdown_telemetry(telemetry_providers);

                info!("Cleanup complete");
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

/// HTTP clients for the users, things and certs services
struct Collaborators {
    users: Arc<HttpUsersClient>,
    things: Arc<HttpThingsRegistry>,
    certs: Arc<HttpCertsClient>,
}

impl Collaborators {
    fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let sdk = |base_url: &str| SdkConfig {
            base_url: base_url.to_string(),
            timeout,
        };

        Ok(Self {
            users: Arc::new(HttpUsersClient::new(&sdk(&config.users_url))?),
            things: Arc::new(HttpThingsRegistry::new(&sdk(&config.things_url))?),
            certs: Arc::new(HttpCertsClient::new(&sdk(&config.certs_url))?),
        })
    }
}

async fn initialize_nats(config: &ServiceConfig) -> anyhow::Result<NatsClient> {
    info!("Initializing NATS...");
    let client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;

    client
        .ensure_stream(&config.things_stream, "Thing and channel lifecycle events")
        .await?;
    client
        .ensure_stream(&config.channel_stream, "Canonical messages per channel")
        .await?;

    Ok(client)
}

fn event_settings(config: &ServiceConfig, group_name: &str) -> EventConsumerSettings {
    EventConsumerSettings {
        stream_name: config.things_stream.clone(),
        group_name: group_name.to_string(),
        instance_name: config.instance_name.clone(),
        filter_subject: config.things_filter_subject.clone(),
        batch_size: config.nats_batch_size,
        max_wait: Duration::from_secs(config.nats_batch_wait_secs),
        backoff: PollBackoff {
            idle_delay: Duration::from_millis(config.poll_idle_delay_ms),
            error_delay: Duration::from_millis(config.poll_error_delay_ms),
        },
    }
}
