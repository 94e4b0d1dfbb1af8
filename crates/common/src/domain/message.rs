use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CHANNEL_SUBJECT_PREFIX: &str = "channel";

/// Bus subject a message for the given channel is published to.
pub fn channel_subject(channel_id: &str) -> String {
    format!("{}.{}", CHANNEL_SUBJECT_PREFIX, channel_id)
}

/// Canonical message carried on the internal bus, whatever protocol it
/// arrived on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub channel: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subtopic: String,
    pub publisher: String,
    pub protocol: String,
    pub content_type: String,
    #[serde(with = "base64_payload")]
    pub payload: Vec<u8>,
    pub created: DateTime<Utc>,
    /// W3C `traceparent` of the span that produced the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_span: Option<String>,
}

impl Message {
    pub fn subject(&self) -> String {
        channel_subject(&self.channel)
    }
}

mod base64_payload {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Publishes canonical messages onto the bus
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: &Message) -> DomainResult<()>;
}
