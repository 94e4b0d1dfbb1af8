use crate::nats::trace_context::extract_trace_context;
use anyhow::{Context, Result};
use async_nats::HeaderMap;
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// A request received on a request/reply endpoint
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub subject: String,
    pub payload: Bytes,
    pub headers: Option<HeaderMap>,
}

/// Encode a reply body as JSON
pub fn json_reply<T: Serialize>(value: &T) -> Bytes {
    match serde_json::to_vec(value) {
        Ok(body) => Bytes::from(body),
        Err(e) => error_reply(&format!("failed to encode reply: {}", e)),
    }
}

/// `{"error": "..."}` reply body
pub fn error_reply(message: &str) -> Bytes {
    Bytes::from(serde_json::json!({ "error": message }).to_string())
}

/// Serves a Tower service over core NATS request/reply.
///
/// Instances subscribe under one queue group, so each request is answered by
/// a single instance. Requests are handled concurrently; a service error is
/// answered with an error body.
pub struct RequestReplyServer<S> {
    client: async_nats::Client,
    subject: String,
    queue_group: String,
    service: S,
}

impl<S> RequestReplyServer<S>
where
    S: Service<ReplyRequest, Response = Bytes, Error = anyhow::Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    pub fn new(
        client: async_nats::Client,
        subject: impl Into<String>,
        queue_group: impl Into<String>,
        service: S,
    ) -> Self {
        Self {
            client,
            subject: subject.into(),
            queue_group: queue_group.into(),
            service,
        }
    }

    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let mut subscriber = self
            .client
            .queue_subscribe(self.subject.clone(), self.queue_group.clone())
            .await
            .with_context(|| format!("failed to subscribe to {}", self.subject))?;

        info!(subject = %self.subject, queue_group = %self.queue_group, "serving requests");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    if let Err(e) = subscriber.unsubscribe().await {
                        warn!(subject = %self.subject, error = %e, "failed to unsubscribe");
                    }
                    break;
                }
                message = subscriber.next() => match message {
                    Some(message) => self.dispatch(message),
                    None => anyhow::bail!("subscription to {} closed", self.subject),
                }
            }
        }

        info!(subject = %self.subject, "request endpoint stopped");
        Ok(())
    }

    fn dispatch(&self, message: async_nats::Message) {
        let Some(reply_to) = message.reply.clone() else {
            warn!(subject = %message.subject, "dropping request without reply subject");
            return;
        };

        let span = info_span!(
            "nats_request",
            otel.kind = "server",
            messaging.system = "nats",
            messaging.destination.name = %message.subject,
            messaging.message.body.size = message.payload.len(),
        );
        if let Some(headers) = &message.headers {
            span.set_parent(extract_trace_context(headers));
        }

        let client = self.client.clone();
        let mut service = self.service.clone();
        let request = ReplyRequest {
            subject: message.subject.to_string(),
            payload: message.payload,
            headers: message.headers,
        };

        tokio::spawn(
            async move {
                let response = match service.ready().await {
                    Ok(service) => service.call(request).await,
                    Err(e) => Err(e),
                };

                let body = response.unwrap_or_else(|e| {
                    error!(error = %e, "request handling failed");
                    error_reply(&e.to_string())
                });

                match client.publish(reply_to, body).await {
                    Ok(()) => debug!("reply sent"),
                    Err(e) => error!(error = %e, "failed to send reply"),
                }
            }
            .instrument(span),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reply_shape() {
        let body = error_reply("config not found");
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({ "error": "config not found" }));
    }

    #[test]
    fn test_json_reply_encodes_value() {
        let body = json_reply(&serde_json::json!({ "thing_id": "th-1" }));
        assert_eq!(&body[..], br#"{"thing_id":"th-1"}"#);
    }
}
