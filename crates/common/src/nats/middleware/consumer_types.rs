use crate::nats::traits::StreamRecord;
use async_nats::HeaderMap;
use bytes::Bytes;

/// Request type for consuming a single stream record through Tower.
///
/// Owns a copy of the record data so it can pass through middleware without
/// borrowing the record, whose acknowledgement stays with the consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub subject: String,
    pub payload: Bytes,
    /// Carries the publisher's trace context when present
    pub headers: Option<HeaderMap>,
}

impl ConsumeRequest {
    pub fn new(subject: String, payload: Bytes, headers: Option<HeaderMap>) -> Self {
        Self {
            subject,
            payload,
            headers,
        }
    }
}

impl From<&StreamRecord> for ConsumeRequest {
    fn from(record: &StreamRecord) -> Self {
        Self::new(
            record.subject.clone(),
            record.payload.clone(),
            record.headers.clone(),
        )
    }
}

/// Outcome of handling one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResponse {
    /// Handled, or can never be handled; acknowledge it
    Ack,
    /// Handling failed; stop the batch and leave the record pending
    Nak(Option<String>),
}

impl ConsumeResponse {
    pub fn ack() -> Self {
        Self::Ack
    }

    pub fn nak(reason: impl Into<String>) -> Self {
        Self::Nak(Some(reason.into()))
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }

    pub fn is_nak(&self) -> bool {
        matches!(self, Self::Nak(_))
    }

    pub fn outcome(&self) -> &'static str {
        if self.is_ack() { "ack" } else { "nak" }
    }
}
