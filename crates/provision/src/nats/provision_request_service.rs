use crate::domain::{ProvisionError, ProvisionService};
use bytes::Bytes;
use common::nats::{ReplyRequest, error_reply, json_reply};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::warn;

pub const PROVISION_SUBJECT: &str = "provision.requests";

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub token: Option<String>,
    pub external_id: String,
    pub external_key: String,
}

/// `{"error": ..., "stage": ...}` reply body
pub fn provision_error_reply(err: &ProvisionError) -> Bytes {
    json_reply(&serde_json::json!({
        "error": err.to_string(),
        "stage": err.stage(),
    }))
}

/// Provisioning entry point over request/reply
#[derive(Clone)]
pub struct ProvisionRequestService {
    service: Arc<ProvisionService>,
}

impl ProvisionRequestService {
    pub fn new(service: Arc<ProvisionService>) -> Self {
        Self { service }
    }
}

impl Service<ReplyRequest> for ProvisionRequestService {
    type Response = Bytes;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<Bytes, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ReplyRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let request: ProvisionRequest = match serde_json::from_slice(&req.payload) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "rejecting malformed provision request");
                    return Ok(error_reply(&format!("malformed provision request: {}", e)));
                }
            };

            let token = request.token.unwrap_or_default();
            match service
                .provision(&token, &request.external_id, &request.external_key)
                .await
            {
                Ok(result) => Ok(json_reply(&result)),
                Err(e) => Ok(provision_error_reply(&e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProvisionProfile;
    use common::domain::{
        MockBootstrapClient, MockCertsClient, MockThingsRegistry, MockTokenIssuer,
    };
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn service(profile: ProvisionProfile, registry: MockThingsRegistry) -> ProvisionRequestService {
        ProvisionRequestService::new(Arc::new(ProvisionService::new(
            profile,
            Arc::new(registry),
            Arc::new(MockTokenIssuer::new()),
            Arc::new(MockCertsClient::new()),
            Arc::new(MockBootstrapClient::new()),
            Duration::from_secs(1),
        )))
    }

    async fn call(service: ProvisionRequestService, body: &str) -> Value {
        let request = ReplyRequest {
            subject: PROVISION_SUBJECT.to_string(),
            payload: Bytes::from(body.to_string()),
            headers: None,
        };
        let reply = service.oneshot(request).await.unwrap();
        serde_json::from_slice(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_error_reply_carries_stage() {
        let body = call(
            service(ProvisionProfile::default(), MockThingsRegistry::new()),
            r#"{"external_id":"aa:bb","external_key":"k"}"#,
        )
        .await;

        assert_eq!(body["stage"], "authenticate");
        assert_eq!(body["error"], "missing credentials");
    }

    #[tokio::test]
    async fn test_successful_run_replies_with_result() {
        let profile = ProvisionProfile::from_toml(
            r#"
[[things]]
name = "gateway"

[[channels]]
name = "data"
"#,
        )
        .unwrap();
        let mut registry = MockThingsRegistry::new();
        registry
            .expect_create_thing()
            .returning(|_, _| Ok("th-1".to_string()));
        registry.expect_view_thing().returning(|_, id| {
            Ok(common::domain::Thing {
                id: id.to_string(),
                key: "thing-key".into(),
                ..Default::default()
            })
        });
        registry
            .expect_create_channel()
            .returning(|_, _| Ok("ch-1".to_string()));
        registry.expect_view_channel().returning(|_, id| {
            Ok(common::domain::Channel {
                id: id.to_string(),
                ..Default::default()
            })
        });

        let body = call(
            service(profile, registry),
            r#"{"token":"user-token","external_id":"aa:bb","external_key":"k"}"#,
        )
        .await;

        assert_eq!(body["things"][0]["key"], "thing-key");
        assert_eq!(body["channels"][0]["id"], "ch-1");
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let body = call(
            service(ProvisionProfile::default(), MockThingsRegistry::new()),
            r#"{"external_id": 1}"#,
        )
        .await;

        assert!(body["error"].as_str().unwrap().starts_with("malformed provision request"));
    }
}
