use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::nats::trace_context::extract_trace_context;
use crate::nats::{ConsumeRequest, ConsumeResponse};
use tower::{Layer, Service};
use tracing::{Instrument, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Tower layer opening a consumer span per record, parented on the trace
/// context the publisher injected into the record headers
#[derive(Clone)]
pub struct NatsConsumeTracingLayer {
    stream_name: String,
    consumer_name: String,
}

impl NatsConsumeTracingLayer {
    pub fn new(stream_name: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            consumer_name: consumer_name.into(),
        }
    }
}

impl<S> Layer<S> for NatsConsumeTracingLayer {
    type Service = NatsConsumeTracingService<S>;

    fn layer(&self, service: S) -> Self::Service {
        NatsConsumeTracingService {
            inner: service,
            stream_name: self.stream_name.clone(),
            consumer_name: self.consumer_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct NatsConsumeTracingService<S> {
    inner: S,
    stream_name: String,
    consumer_name: String,
}

impl<S> Service<ConsumeRequest> for NatsConsumeTracingService<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse> + Clone + Send + 'static,
    S::Error: Send,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let span = info_span!(
            target: "nats",
            "nats_consume",
            otel.name = %format!("{} receive", req.subject),
            otel.kind = "consumer",
            messaging.system = "nats",
            messaging.operation = "receive",
            messaging.destination.name = %self.stream_name,
            messaging.consumer.name = %self.consumer_name,
            messaging.message.body.size = req.payload.len(),
            messaging.outcome = tracing::field::Empty,
        );

        if let Some(headers) = &req.headers {
            span.set_parent(extract_trace_context(headers));
        }

        let mut inner = self.inner.clone();
        let record_span = span.clone();

        Box::pin(
            async move {
                let result = inner.call(req).await;
                if let Ok(response) = &result {
                    record_span.record("messaging.outcome", response.outcome());
                }
                result
            }
            .instrument(span),
        )
    }
}
