use crate::domain::{DomainError, DomainResult, Message, MessagePublisher};
use crate::nats::JetStreamPublisher;
use crate::nats::trace_context::{inject_trace_context, traceparent};
use anyhow::Context;
use async_nats::HeaderMap;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// NATS JetStream producer for canonical bus messages.
///
/// Messages go to `channel.<id>`; the publishing span's `traceparent` is
/// both sent as a header and stamped on the message itself.
pub struct NatsMessageProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
}

impl NatsMessageProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>) -> Self {
        Self { jetstream }
    }
}

#[async_trait]
impl MessagePublisher for NatsMessageProducer {
    async fn publish(&self, message: &Message) -> DomainResult<()> {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        let mut message = message.clone();
        if message.trace_span.is_none() {
            message.trace_span = traceparent(&headers);
        }

        let subject = message.subject();
        let payload = serde_json::to_vec(&message)
            .context("Failed to encode message")
            .map_err(DomainError::RepositoryError)?;

        debug!(
            subject = %subject,
            publisher = %message.publisher,
            protocol = %message.protocol,
            size_bytes = payload.len(),
            "Publishing message"
        );

        self.jetstream
            .publish(subject, headers, payload.into())
            .await
            .context("Failed to publish and acknowledge message")
            .map_err(DomainError::RepositoryError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::MockJetStreamPublisher;
    use bytes::Bytes;

    fn message() -> Message {
        Message {
            channel: "ch-1".to_string(),
            subtopic: "2".to_string(),
            publisher: "0011223344556677".to_string(),
            protocol: "lora".to_string(),
            content_type: "application/octet-stream".to_string(),
            payload: vec![0x01, 0x02, 0x03],
            created: chrono::Utc::now(),
            trace_span: None,
        }
    }

    #[tokio::test]
    async fn test_publish_to_channel_subject() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .withf(|subject: &String, _headers: &HeaderMap, payload: &Bytes| {
                let decoded: Message = serde_json::from_slice(payload).unwrap();
                subject == "channel.ch-1" && decoded.payload == vec![0x01, 0x02, 0x03]
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let producer = NatsMessageProducer::new(Arc::new(mock_jetstream));

        assert!(producer.publish(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_failure() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("NATS publish failed")));

        let producer = NatsMessageProducer::new(Arc::new(mock_jetstream));

        let result = producer.publish(&message()).await;
        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }
}
