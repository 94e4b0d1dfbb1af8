use anyhow::Result;
use async_nats::HeaderMap;
use async_nats::jetstream;
use async_trait::async_trait;
use bytes::Bytes;

/// Trait for JetStream consumer operations
/// Abstracts the operations needed to create and use a NATS JetStream consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamConsumer: Send + Sync {
    /// Create a durable pull consumer on a stream, or bind to it if it exists
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>>;
}

/// Trait for pull consumer operations
/// Abstracts the fetch operation on a pull consumer
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PullConsumer: Send + Sync {
    /// Fetch undelivered or pending records in delivery order.
    /// Returns up to max_records, waiting up to expires for the batch to fill
    async fn fetch_records(
        &self,
        max_records: usize,
        expires: std::time::Duration,
    ) -> Result<Vec<StreamRecord>>;
}

/// Settles the delivery of a single record
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RecordAcker: Send + Sync {
    /// Mark the record processed; it will not be delivered again
    async fn ack(&self) -> Result<()>;

    /// Return the record to pending for redelivery
    async fn nak(&self) -> Result<()>;
}

/// A record fetched from a durable stream, owning its acknowledgement handle
pub struct StreamRecord {
    pub subject: String,
    pub payload: Bytes,
    pub headers: Option<HeaderMap>,
    acker: Box<dyn RecordAcker>,
}

impl StreamRecord {
    pub fn new(
        subject: impl Into<String>,
        payload: Bytes,
        headers: Option<HeaderMap>,
        acker: Box<dyn RecordAcker>,
    ) -> Self {
        Self {
            subject: subject.into(),
            payload,
            headers,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nak(&self) -> Result<()> {
        self.acker.nak().await
    }
}

impl std::fmt::Debug for StreamRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRecord")
            .field("subject", &self.subject)
            .field("payload_bytes", &self.payload.len())
            .finish()
    }
}

/// Trait for JetStream publisher operations
/// Abstracts the operations needed to create streams and publish messages
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamPublisher: Send + Sync {
    /// Get an existing stream by name
    async fn get_stream(&self, stream_name: &str) -> Result<()>;

    /// Create a new stream with the given configuration
    async fn create_stream(&self, config: jetstream::stream::Config) -> Result<()>;

    /// Publish a message to a subject and await acknowledgment
    async fn publish(&self, subject: String, headers: HeaderMap, payload: Bytes) -> Result<()>;
}
