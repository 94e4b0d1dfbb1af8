use crate::domain::{LifecycleEvent, LifecycleEventHandler, decode_record};
use crate::nats::{ConsumeRequest, ConsumeResponse};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::{debug, error, warn};

/// Tower service decoding lifecycle records and applying them through a
/// handler.
///
/// Records that can never be applied (undecodable payloads, known operations
/// with missing fields, unknown operations) are acknowledged so they do not
/// block the records behind them. Handler failures nak the record.
pub struct LifecycleEventService<H: ?Sized> {
    handler: Arc<H>,
}

impl<H: ?Sized> LifecycleEventService<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

impl<H: ?Sized> Clone for LifecycleEventService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<H> Service<ConsumeRequest> for LifecycleEventService<H>
where
    H: LifecycleEventHandler + ?Sized + 'static,
{
    type Response = ConsumeResponse;
    type Error = anyhow::Error;
    type Future = BoxFuture<'static, Result<ConsumeResponse, anyhow::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConsumeRequest) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move {
            let event = match decode_record(&req.payload).and_then(|r| LifecycleEvent::decode(&r)) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(subject = %req.subject, "ignoring unknown lifecycle operation");
                    return Ok(ConsumeResponse::Ack);
                }
                Err(e) => {
                    warn!(subject = %req.subject, error = %e, "dropping malformed lifecycle record");
                    return Ok(ConsumeResponse::Ack);
                }
            };

            let operation = event.operation();
            let entity_id = event.entity_id().to_string();

            match handler.handle(event).await {
                Ok(()) => {
                    debug!(operation, entity_id = %entity_id, "applied lifecycle event");
                    Ok(ConsumeResponse::Ack)
                }
                Err(e) => {
                    error!(operation, entity_id = %entity_id, error = %e, "failed to apply lifecycle event");
                    Ok(ConsumeResponse::nak(e.to_string()))
                }
            }
        })
    }
}
