use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::nats::{ConsumeRequest, ConsumeResponse};
use tower::{Layer, Service};
use tracing::{Instrument, Span, error, info, warn};

/// Tower layer logging the outcome of every consumed record
#[derive(Clone)]
pub struct NatsConsumeLoggingLayer {
    consumer_name: String,
}

impl NatsConsumeLoggingLayer {
    pub fn new(consumer_name: impl Into<String>) -> Self {
        Self {
            consumer_name: consumer_name.into(),
        }
    }
}

impl<S> Layer<S> for NatsConsumeLoggingLayer {
    type Service = NatsConsumeLoggingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeLoggingService {
            inner: service,
            consumer_name: self.consumer_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct NatsConsumeLoggingService<S> {
    inner: S,
    consumer_name: String,
}

impl<S> Service<ConsumeRequest> for NatsConsumeLoggingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: std::fmt::Display + Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let subject = req.subject.clone();
        let payload_size = req.payload.len();
        let consumer = self.consumer_name.clone();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        let span = Span::current();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                let duration_ms = start.elapsed().as_millis();

                match &result {
                    Ok(ConsumeResponse::Ack) => {
                        info!(
                            consumer = %consumer,
                            subject = %subject,
                            payload_bytes = payload_size,
                            outcome = "ack",
                            duration_ms = %duration_ms,
                            "consumed {subject} in {duration_ms}ms [ack]"
                        );
                    }
                    Ok(ConsumeResponse::Nak(reason)) => {
                        warn!(
                            consumer = %consumer,
                            subject = %subject,
                            payload_bytes = payload_size,
                            outcome = "nak",
                            reason = reason.as_deref().unwrap_or(""),
                            duration_ms = %duration_ms,
                            "consumed {subject} in {duration_ms}ms [nak]"
                        );
                    }
                    Err(e) => {
                        error!(
                            consumer = %consumer,
                            subject = %subject,
                            payload_bytes = payload_size,
                            duration_ms = %duration_ms,
                            error = %e,
                            "failed to consume {subject} in {duration_ms}ms: {e}"
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
