use crate::domain::{RouteMapRepository, UplinkFrame, decode_uplink};
use common::domain::{DomainError, Message, MessagePublisher};
use std::sync::Arc;
use tracing::{debug, warn};

pub const LORA_PROTOCOL: &str = "lora";
pub const LORA_CONTENT_TYPE: &str = "application/octet-stream";

/// What became of an inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Published { channel: String },
    /// The frame was dropped; live traffic is never retried
    Dropped { reason: String },
}

/// Routes LoRa uplinks onto the bus, resolving the target channel through
/// the route map
pub struct LoraMessageRouter {
    route_map: Arc<dyn RouteMapRepository>,
    publisher: Arc<dyn MessagePublisher>,
}

impl LoraMessageRouter {
    pub fn new(route_map: Arc<dyn RouteMapRepository>, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            route_map,
            publisher,
        }
    }

    /// Decode and route a raw uplink payload
    pub async fn route_raw(&self, raw: &[u8]) -> RouteOutcome {
        match decode_uplink(raw) {
            Ok(frame) => self.route(frame).await,
            Err(e) => {
                warn!(error = %e, "dropping undecodable uplink");
                dropped(e)
            }
        }
    }

    pub async fn route(&self, frame: UplinkFrame) -> RouteOutcome {
        let channel = match self.route_map.channel(&frame.app_id).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                warn!(app_id = %frame.app_id, dev_eui = %frame.dev_eui, "no route for LoRa application, dropping uplink");
                return dropped(DomainError::RouteNotFound(frame.app_id));
            }
            Err(e) => {
                warn!(app_id = %frame.app_id, error = %e, "route lookup failed, dropping uplink");
                return dropped(e);
            }
        };

        let message = Message {
            channel: channel.clone(),
            subtopic: frame.f_port.map(|port| port.to_string()).unwrap_or_default(),
            publisher: frame.dev_eui,
            protocol: LORA_PROTOCOL.to_string(),
            content_type: LORA_CONTENT_TYPE.to_string(),
            payload: frame.payload,
            created: chrono::Utc::now(),
            trace_span: None,
        };

        match self.publisher.publish(&message).await {
            Ok(()) => {
                debug!(channel = %channel, publisher = %message.publisher, "uplink published");
                RouteOutcome::Published { channel }
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "failed to publish uplink, dropping");
                dropped(e)
            }
        }
    }
}

fn dropped(e: DomainError) -> RouteOutcome {
    RouteOutcome::Dropped {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KeyValueRouteMap, MockRouteMapRepository};
    use common::domain::MockMessagePublisher;

    const UPLINK: &[u8] = br#"{"applicationID":"3","devEUI":"0102030405ABCDEF","fPort":5,"data":"AQID"}"#;

    #[tokio::test]
    async fn test_routed_uplink_becomes_canonical_message() {
        let routes = Arc::new(KeyValueRouteMap::in_memory());
        routes.save("3", "ch-9").await.unwrap();

        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .withf(|msg: &Message| {
                msg.channel == "ch-9"
                    && msg.subject() == "channel.ch-9"
                    && msg.subtopic == "5"
                    && msg.publisher == "0102030405abcdef"
                    && msg.protocol == "lora"
                    && msg.content_type == "application/octet-stream"
                    && msg.payload == vec![1, 2, 3]
            })
            .times(1)
            .returning(|_| Ok(()));

        let router = LoraMessageRouter::new(routes, Arc::new(publisher));

        assert_eq!(
            router.route_raw(UPLINK).await,
            RouteOutcome::Published {
                channel: "ch-9".into()
            }
        );
    }

    #[tokio::test]
    async fn test_route_miss_drops_without_publishing() {
        let mut publisher = MockMessagePublisher::new();
        publisher.expect_publish().never();
        let router = LoraMessageRouter::new(
            Arc::new(KeyValueRouteMap::in_memory()),
            Arc::new(publisher),
        );

        let outcome = router.route_raw(UPLINK).await;

        assert!(matches!(outcome, RouteOutcome::Dropped { reason } if reason.contains("Route not found")));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped_before_lookup() {
        let mut routes = MockRouteMapRepository::new();
        routes.expect_channel().never();
        let mut publisher = MockMessagePublisher::new();
        publisher.expect_publish().never();
        let router = LoraMessageRouter::new(Arc::new(routes), Arc::new(publisher));

        let outcome = router.route_raw(b"{\"devEUI\": 42}").await;

        assert!(matches!(outcome, RouteOutcome::Dropped { .. }));
    }

    #[tokio::test]
    async fn test_publish_failure_is_dropped() {
        let mut routes = MockRouteMapRepository::new();
        routes
            .expect_channel()
            .returning(|_| Ok(Some("ch-9".to_string())));
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_| Err(DomainError::Unavailable("bus down".into())));
        let router = LoraMessageRouter::new(Arc::new(routes), Arc::new(publisher));

        assert!(matches!(
            router.route_raw(UPLINK).await,
            RouteOutcome::Dropped { .. }
        ));
    }
}
