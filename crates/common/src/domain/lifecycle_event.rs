use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Free-form entity metadata as carried by the registry.
pub type Metadata = Map<String, Value>;

/// One record of the upstream change log: a flat string-keyed map.
pub type EventRecord = HashMap<String, String>;

pub const OPERATION_FIELD: &str = "operation";

/// Operation tags understood at the log boundary
pub mod operation {
    pub const THING_CREATE: &str = "thing.create";
    pub const THING_UPDATE: &str = "thing.update";
    pub const THING_REMOVE: &str = "thing.remove";
    pub const THING_CONNECT: &str = "thing.connect";
    pub const THING_DISCONNECT: &str = "thing.disconnect";
    pub const CHANNEL_CREATE: &str = "channel.create";
    pub const CHANNEL_UPDATE: &str = "channel.update";
    pub const CHANNEL_REMOVE: &str = "channel.remove";
}

/// A registry lifecycle event, decoded once from its flat log record.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    ThingCreated {
        id: String,
        owner: String,
        name: Option<String>,
        metadata: Option<Metadata>,
    },
    ThingUpdated {
        id: String,
        name: Option<String>,
        metadata: Option<Metadata>,
    },
    ThingRemoved {
        id: String,
    },
    ThingConnected {
        channel_id: String,
        thing_id: String,
    },
    ThingDisconnected {
        channel_id: String,
        thing_id: String,
    },
    ChannelCreated {
        id: String,
        owner: String,
        name: Option<String>,
        metadata: Option<Metadata>,
    },
    ChannelUpdated {
        id: String,
        name: Option<String>,
        metadata: Option<Metadata>,
    },
    ChannelRemoved {
        id: String,
    },
}

impl LifecycleEvent {
    /// Decode a log record.
    ///
    /// Returns `Ok(None)` for operation tags this build does not know about,
    /// and `MalformedEvent` when a known tag is missing a required field.
    pub fn decode(record: &EventRecord) -> DomainResult<Option<Self>> {
        let op = record
            .get(OPERATION_FIELD)
            .filter(|op| !op.is_empty())
            .ok_or_else(|| DomainError::MalformedEvent("record has no operation".to_string()))?;
        let fields = RecordFields { op, record };

        let event = match op.as_str() {
            operation::THING_CREATE => Self::ThingCreated {
                id: fields.required("id")?,
                owner: fields.required("owner")?,
                name: fields.optional("name"),
                metadata: fields.metadata()?,
            },
            operation::THING_UPDATE => Self::ThingUpdated {
                id: fields.required("id")?,
                name: fields.optional("name"),
                metadata: fields.metadata()?,
            },
            operation::THING_REMOVE => Self::ThingRemoved {
                id: fields.required("id")?,
            },
            operation::THING_CONNECT => Self::ThingConnected {
                channel_id: fields.required("chan_id")?,
                thing_id: fields.required("thing_id")?,
            },
            operation::THING_DISCONNECT => Self::ThingDisconnected {
                channel_id: fields.required("chan_id")?,
                thing_id: fields.required("thing_id")?,
            },
            operation::CHANNEL_CREATE => Self::ChannelCreated {
                id: fields.required("id")?,
                owner: fields.required("owner")?,
                name: fields.optional("name"),
                metadata: fields.metadata()?,
            },
            operation::CHANNEL_UPDATE => Self::ChannelUpdated {
                id: fields.required("id")?,
                name: fields.optional("name"),
                metadata: fields.metadata()?,
            },
            operation::CHANNEL_REMOVE => Self::ChannelRemoved {
                id: fields.required("id")?,
            },
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    pub fn operation(&self) -> &'static str {
        match self {
            Self::ThingCreated { .. } => operation::THING_CREATE,
            Self::ThingUpdated { .. } => operation::THING_UPDATE,
            Self::ThingRemoved { .. } => operation::THING_REMOVE,
            Self::ThingConnected { .. } => operation::THING_CONNECT,
            Self::ThingDisconnected { .. } => operation::THING_DISCONNECT,
            Self::ChannelCreated { .. } => operation::CHANNEL_CREATE,
            Self::ChannelUpdated { .. } => operation::CHANNEL_UPDATE,
            Self::ChannelRemoved { .. } => operation::CHANNEL_REMOVE,
        }
    }

    /// The entity the event is about. Connection events report the thing.
    pub fn entity_id(&self) -> &str {
        match self {
            Self::ThingCreated { id, .. }
            | Self::ThingUpdated { id, .. }
            | Self::ThingRemoved { id }
            | Self::ChannelCreated { id, .. }
            | Self::ChannelUpdated { id, .. }
            | Self::ChannelRemoved { id } => id,
            Self::ThingConnected { thing_id, .. } | Self::ThingDisconnected { thing_id, .. } => {
                thing_id
            }
        }
    }

    /// Encode into the flat record shape written to the log.
    pub fn to_record(&self) -> EventRecord {
        let mut record = EventRecord::new();
        record.insert(OPERATION_FIELD.to_string(), self.operation().to_string());

        let mut put = |key: &str, value: &str| {
            record.insert(key.to_string(), value.to_string());
        };

        match self {
            Self::ThingCreated {
                id,
                owner,
                name,
                metadata,
            }
            | Self::ChannelCreated {
                id,
                owner,
                name,
                metadata,
            } => {
                put("id", id);
                put("owner", owner);
                if let Some(name) = name {
                    put("name", name);
                }
                if let Some(metadata) = metadata {
                    put("metadata", &Value::Object(metadata.clone()).to_string());
                }
            }
            Self::ThingUpdated { id, name, metadata } | Self::ChannelUpdated { id, name, metadata } => {
                put("id", id);
                if let Some(name) = name {
                    put("name", name);
                }
                if let Some(metadata) = metadata {
                    put("metadata", &Value::Object(metadata.clone()).to_string());
                }
            }
            Self::ThingRemoved { id } | Self::ChannelRemoved { id } => put("id", id),
            Self::ThingConnected {
                channel_id,
                thing_id,
            }
            | Self::ThingDisconnected {
                channel_id,
                thing_id,
            } => {
                put("chan_id", channel_id);
                put("thing_id", thing_id);
            }
        }

        record
    }
}

struct RecordFields<'a> {
    op: &'a str,
    record: &'a EventRecord,
}

impl RecordFields<'_> {
    fn required(&self, key: &str) -> DomainResult<String> {
        self.optional(key).ok_or_else(|| {
            DomainError::MalformedEvent(format!("{} record is missing `{}`", self.op, key))
        })
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.record.get(key).filter(|v| !v.is_empty()).cloned()
    }

    fn metadata(&self) -> DomainResult<Option<Metadata>> {
        match self.optional("metadata") {
            None => Ok(None),
            Some(raw) => serde_json::from_str::<Metadata>(&raw).map(Some).map_err(|e| {
                DomainError::MalformedEvent(format!("{} record has invalid metadata: {}", self.op, e))
            }),
        }
    }
}

/// Parse a log payload into a flat record.
///
/// Non-string scalars are stringified and nested objects are re-encoded as
/// JSON text, so producers that embed metadata as an object still decode.
pub fn decode_record(payload: &[u8]) -> DomainResult<EventRecord> {
    let raw: Map<String, Value> = serde_json::from_slice(payload)
        .map_err(|e| DomainError::MalformedEvent(format!("payload is not a flat JSON map: {}", e)))?;

    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// Applies decoded lifecycle events to a local materialized view.
///
/// Implementations must be idempotent: the log delivers at least once.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LifecycleEventHandler: Send + Sync {
    async fn handle(&self, event: LifecycleEvent) -> DomainResult<()>;
}

/// Appends lifecycle events to the upstream log
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LifecycleEventProducer: Send + Sync {
    async fn publish_event(&self, event: &LifecycleEvent) -> DomainResult<()>;
}
