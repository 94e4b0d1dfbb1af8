use crate::domain::{LoraMessageRouter, RouteOutcome};
use crate::mqtt::parse_uplink_topic;
use anyhow::{Context, Result, anyhow, bail};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, instrument, warn};

#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    /// `mqtt://host:port`, `tcp://host:port` or `host:port`
    pub broker_url: String,
    pub client_id: String,
    pub topic: String,
    pub max_retry_attempts: u32,
    pub retry_delay: Duration,
}

/// Consecutive connection failures, cleared whenever the broker accepts us
#[derive(Debug)]
struct RetryBudget {
    max_attempts: u32,
    failures: u32,
}

impl RetryBudget {
    fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            failures: 0,
        }
    }

    fn connected(&mut self) {
        self.failures = 0;
    }

    /// Count a failure; `false` once the budget is spent
    fn record_failure(&mut self) -> bool {
        self.failures += 1;
        self.failures < self.max_attempts
    }
}

/// Subscribe to the LoRa uplink topic and route every frame.
///
/// Consecutive connection failures are retried up to `max_retry_attempts`;
/// running out of attempts is an error so the process stops. A successful
/// ConnAck starts the count over.
#[instrument(
    name = "mqtt_subscriber",
    skip_all,
    fields(broker_url = %config.broker_url, topic = %config.topic)
)]
pub async fn run_mqtt_subscriber(
    config: MqttSubscriberConfig,
    router: Arc<LoraMessageRouter>,
    ctx: CancellationToken,
) -> Result<()> {
    info!("starting LoRa MQTT subscriber");

    let mut retries = RetryBudget::new(config.max_retry_attempts);

    loop {
        if ctx.is_cancelled() {
            debug!("MQTT subscriber cancelled before connection");
            return Ok(());
        }

        match run_mqtt_connection(&config, &router, &ctx, &mut retries).await {
            Ok(()) => {
                info!("MQTT subscriber stopped");
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                if !retries.record_failure() {
                    bail!(
                        "giving up on MQTT broker {} after {} attempts: {}",
                        config.broker_url,
                        retries.failures,
                        e
                    );
                }

                warn!(
                    attempt = retries.failures,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = ctx.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }
            }
        }
    }
}

async fn run_mqtt_connection(
    config: &MqttSubscriberConfig,
    router: &Arc<LoraMessageRouter>,
    ctx: &CancellationToken,
    retries: &mut RetryBudget,
) -> Result<()> {
    let (host, port) = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    client
        .subscribe(&config.topic, QoS::AtLeastOnce)
        .await
        .context("failed to subscribe")?;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_uplink(router, &publish.topic, &publish.payload).await;
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                        retries.connected();
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!(topic = %config.topic, "subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => return Err(anyhow!("MQTT event loop error: {}", e)),
                }
            }
        }
    }
}

/// Route one uplink under its own root span
pub(crate) async fn handle_uplink(
    router: &LoraMessageRouter,
    topic: &str,
    payload: &[u8],
) -> RouteOutcome {
    let span = info_span!(
        parent: Span::none(),
        "lora_uplink",
        topic = %topic,
        payload_size = payload.len(),
        app_id = tracing::field::Empty,
        dev_eui = tracing::field::Empty,
    );

    async {
        match parse_uplink_topic(topic) {
            Ok(parsed) => {
                Span::current().record("app_id", parsed.app_id.as_str());
                Span::current().record("dev_eui", parsed.dev_eui.as_str());
            }
            // The frame body is authoritative; the topic only labels the span
            Err(e) => debug!(error = %e, "unexpected uplink topic"),
        }

        router.route_raw(payload).await
    }
    .instrument(span)
    .await
}

/// Parse broker URL in format mqtt://host:port, tcp://host:port or host:port
fn parse_broker_url(url: &str) -> Result<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://").trim_start_matches("tcp://");

    match url.split(':').collect::<Vec<_>>().as_slice() {
        [host] if !host.is_empty() => Ok((*host, 1883)),
        [host, port] if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid port in broker URL: {}", port))?;
            Ok((*host, port))
        }
        _ => bail!("invalid broker URL format: {}", url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KeyValueRouteMap, RouteMapRepository};
    use common::domain::{Message, MockMessagePublisher};

    #[test]
    fn test_parse_broker_url() {
        assert_eq!(parse_broker_url("mqtt://localhost:1883").unwrap(), ("localhost", 1883));
        assert_eq!(parse_broker_url("tcp://lora.local:8883").unwrap(), ("lora.local", 8883));
        assert_eq!(parse_broker_url("broker.local").unwrap(), ("broker.local", 1883));
        assert!(parse_broker_url("mqtt://host:notaport").is_err());
        assert!(parse_broker_url("mqtt://a:1:2").is_err());
    }

    #[tokio::test]
    async fn test_handle_uplink_publishes_to_bound_channel() {
        let routes = Arc::new(KeyValueRouteMap::in_memory());
        routes.save("7", "ch-1").await.unwrap();

        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .withf(|msg: &Message| msg.channel == "ch-1" && msg.payload == b"hi".to_vec())
            .times(1)
            .returning(|_| Ok(()));
        let router = LoraMessageRouter::new(routes, Arc::new(publisher));

        let outcome = handle_uplink(
            &router,
            "application/7/device/0011223344556677/rx",
            br#"{"applicationID":"7","devEUI":"0011223344556677","data":"aGk="}"#,
        )
        .await;

        assert_eq!(outcome, RouteOutcome::Published { channel: "ch-1".into() });
    }

    #[test]
    fn test_retry_budget_starts_over_after_connack() {
        let mut retries = RetryBudget::new(3);

        assert!(retries.record_failure());
        assert!(retries.record_failure());
        retries.connected();

        // A broker that drops us now and then never exhausts the budget
        for _ in 0..5 {
            assert!(retries.record_failure());
            retries.connected();
        }

        assert!(retries.record_failure());
        assert!(retries.record_failure());
        assert!(!retries.record_failure());
    }

    #[tokio::test]
    async fn test_subscriber_gives_up_after_max_attempts() {
        let router = Arc::new(LoraMessageRouter::new(
            Arc::new(KeyValueRouteMap::in_memory()),
            Arc::new(MockMessagePublisher::new()),
        ));
        let config = MqttSubscriberConfig {
            broker_url: "mqtt://host:notaport".into(),
            client_id: "lora-test".into(),
            topic: crate::mqtt::UPLINK_TOPIC.into(),
            max_retry_attempts: 2,
            retry_delay: Duration::from_millis(1),
        };

        let result = run_mqtt_subscriber(config, router, CancellationToken::new()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_subscriber_stops_when_cancelled() {
        let router = Arc::new(LoraMessageRouter::new(
            Arc::new(KeyValueRouteMap::in_memory()),
            Arc::new(MockMessagePublisher::new()),
        ));
        let config = MqttSubscriberConfig {
            broker_url: "mqtt://127.0.0.1:1".into(),
            client_id: "lora-test".into(),
            topic: crate::mqtt::UPLINK_TOPIC.into(),
            max_retry_attempts: 3,
            retry_delay: Duration::from_secs(60),
        };
        let ctx = CancellationToken::new();
        ctx.cancel();

        assert!(run_mqtt_subscriber(config, router, ctx).await.is_ok());
    }
}
