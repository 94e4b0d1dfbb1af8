use crate::domain::BootstrapService;
use bytes::Bytes;
use common::nats::{ReplyRequest, error_reply, json_reply};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, warn};

pub const HANDSHAKE_SUBJECT: &str = "bootstrap.handshake";

#[derive(Debug, Deserialize)]
pub struct HandshakeRequest {
    pub external_id: String,
    pub external_key: String,
}

/// Device handshake over request/reply: the matching config as JSON, or an
/// error body
#[derive(Clone)]
pub struct HandshakeService {
    service: Arc<BootstrapService>,
}

impl HandshakeService {
    pub fn new(service: Arc<BootstrapService>) -> Self {
        Self { service }
    }
}

impl Service<ReplyRequest> for HandshakeService {
    type Response = Bytes;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<Bytes, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ReplyRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let handshake: HandshakeRequest = match serde_json::from_slice(&req.payload) {
                Ok(handshake) => handshake,
                Err(e) => {
                    warn!(error = %e, "rejecting malformed handshake");
                    return Ok(error_reply(&format!("malformed handshake: {}", e)));
                }
            };

            match service
                .bootstrap(&handshake.external_id, &handshake.external_key)
                .await
            {
                Ok(config) => {
                    debug!(thing_id = %config.thing_id, "handshake answered");
                    Ok(json_reply(&config))
                }
                Err(e) => Ok(error_reply(&e.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BootstrapConfig, ConfigRepository, InMemoryConfigRepository};
    use common::domain::{MockIdentityProvider, MockThingsRegistry};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn handshake_service() -> (HandshakeService, Arc<InMemoryConfigRepository>) {
        let repo = Arc::new(InMemoryConfigRepository::new());
        repo.save(BootstrapConfig {
            thing_id: "th-1".into(),
            owner: "alice@example.com".into(),
            thing_key: "thing-secret".into(),
            external_id: "aa:bb:cc".into(),
            external_key: "device-secret".into(),
            content: "{\"interval\":30}".into(),
            ..Default::default()
        })
        .await
        .unwrap();

        let service = BootstrapService::new(
            repo.clone(),
            Arc::new(MockIdentityProvider::new()),
            Arc::new(MockThingsRegistry::new()),
            Duration::from_secs(1),
        );
        (HandshakeService::new(Arc::new(service)), repo)
    }

    fn request(body: &str) -> ReplyRequest {
        ReplyRequest {
            subject: HANDSHAKE_SUBJECT.to_string(),
            payload: Bytes::from(body.to_string()),
            headers: None,
        }
    }

    async fn reply(service: HandshakeService, body: &str) -> Value {
        let bytes = service.oneshot(request(body)).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_matching_device_gets_its_config() {
        let (service, _) = handshake_service().await;

        let body = reply(
            service,
            r#"{"external_id":"aa:bb:cc","external_key":"device-secret"}"#,
        )
        .await;

        assert_eq!(body["thing_id"], "th-1");
        assert_eq!(body["thing_key"], "thing-secret");
        assert_eq!(body["content"], "{\"interval\":30}");
    }

    #[tokio::test]
    async fn test_wrong_key_gets_not_found_and_is_recorded() {
        let (service, repo) = handshake_service().await;

        let body = reply(
            service,
            r#"{"external_id":"aa:bb:cc","external_key":"guess"}"#,
        )
        .await;

        assert!(body["error"].as_str().unwrap().contains("not found"));
        assert!(body.get("thing_key").is_none());
        assert_eq!(repo.retrieve_unknown(0, 10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_body() {
        let (service, _) = handshake_service().await;

        let body = reply(service, "not json").await;

        assert!(body["error"].as_str().unwrap().starts_with("malformed handshake"));
    }
}
