use crate::nats::{ConsumeRequest, ConsumeResponse, JetStreamConsumer, PullConsumer, StreamRecord};
use anyhow::{Context, Result};
use async_nats::jetstream;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};

/// Sleep policy between polls of the change log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBackoff {
    /// After a poll that returned nothing
    pub idle_delay: Duration,
    /// After a fetch error or a halted batch
    pub error_delay: Duration,
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(500),
            error_delay: Duration::from_secs(1),
        }
    }
}

impl PollBackoff {
    pub fn delay_after(&self, poll: &PollOutcome) -> Option<Duration> {
        match poll {
            PollOutcome::Empty => Some(self.idle_delay),
            PollOutcome::FetchFailed(_) => Some(self.error_delay),
            PollOutcome::Batch(BatchOutcome::Halted { .. }) => Some(self.error_delay),
            PollOutcome::Batch(BatchOutcome::Completed { .. }) => None,
        }
    }
}

/// Result of applying one fetched batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every record was handled and acknowledged
    Completed { acked: usize },
    /// A record failed; it and every later record were left pending
    Halted {
        acked: usize,
        pending: usize,
        reason: String,
    },
}

impl BatchOutcome {
    pub fn acked(&self) -> usize {
        match self {
            Self::Completed { acked } | Self::Halted { acked, .. } => *acked,
        }
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Empty,
    Batch(BatchOutcome),
    FetchFailed(String),
}

/// Where and how an event stream consumer reads
#[derive(Debug, Clone)]
pub struct EventConsumerSettings {
    pub stream_name: String,
    /// Durable consumer shared by competing instances
    pub group_name: String,
    /// Identity of this instance, for logs
    pub instance_name: String,
    pub filter_subject: String,
    pub batch_size: usize,
    pub max_wait: Duration,
    pub backoff: PollBackoff,
}

/// Durable, ordered, at-least-once reader of a lifecycle stream.
///
/// Records of a batch go through the Tower service one at a time in
/// delivery order. Each record is acknowledged right after the service acks
/// it. The first nak or service error stops the batch: that record and all
/// records after it are returned to pending, to be redelivered in order on
/// the next poll.
pub struct EventStreamConsumer<S> {
    consumer: Box<dyn PullConsumer>,
    settings: EventConsumerSettings,
    service: S,
}

impl<S> EventStreamConsumer<S>
where
    S: Service<ConsumeRequest, Response = ConsumeResponse, Error = anyhow::Error> + Send + 'static,
    S::Future: Send + 'static,
{
    /// Bind to the durable consumer group, creating it on first use
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        settings: EventConsumerSettings,
        service: S,
    ) -> Result<Self> {
        debug!(
            stream = %settings.stream_name,
            group = %settings.group_name,
            instance = %settings.instance_name,
            filter_subject = %settings.filter_subject,
            "creating event stream consumer"
        );

        let config = jetstream::consumer::pull::Config {
            durable_name: Some(settings.group_name.clone()),
            filter_subject: settings.filter_subject.clone(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            deliver_policy: jetstream::consumer::DeliverPolicy::All,
            ..Default::default()
        };

        let consumer = jetstream
            .create_consumer(config, &settings.stream_name)
            .await
            .context("failed to create consumer")?;

        Ok(Self {
            consumer,
            settings,
            service,
        })
    }

    /// Poll until cancelled. An in-flight batch is abandoned on cancellation;
    /// its unacknowledged records are redelivered to the group.
    pub async fn run(mut self, ctx: CancellationToken) -> Result<()> {
        info!(
            stream = %self.settings.stream_name,
            group = %self.settings.group_name,
            instance = %self.settings.instance_name,
            "starting event stream consumer"
        );

        // Owned, so the loop holds no borrow of the token across awaits
        let cancelled = ctx.cancelled_owned();
        tokio::pin!(cancelled);

        loop {
            let poll = tokio::select! {
                biased;
                _ = &mut cancelled => break,
                poll = self.poll_once() => poll,
            };

            if let Some(delay) = self.settings.backoff.delay_after(&poll) {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        info!(
            stream = %self.settings.stream_name,
            instance = %self.settings.instance_name,
            "event stream consumer stopped"
        );
        Ok(())
    }

    /// Fetch one batch and apply it
    pub fn poll_once(&mut self) -> BoxFuture<'_, PollOutcome> {
        Box::pin(async move {
            let fetched = self
                .consumer
                .fetch_records(self.settings.batch_size, self.settings.max_wait)
                .await;

            match fetched {
                Err(e) => {
                    warn!(
                        stream = %self.settings.stream_name,
                        instance = %self.settings.instance_name,
                        error = %e,
                        "failed to fetch records, backing off"
                    );
                    PollOutcome::FetchFailed(e.to_string())
                }
                Ok(records) if records.is_empty() => {
                    debug!("no records pending");
                    PollOutcome::Empty
                }
                Ok(records) => PollOutcome::Batch(self.process_batch(records).await),
            }
        })
    }

    pub async fn process_batch(&mut self, records: Vec<StreamRecord>) -> BatchOutcome {
        debug!(record_count = records.len(), "processing record batch");

        let mut acked = 0;
        let mut records = records.into_iter();

        while let Some(record) = records.next() {
            let response = match self.service.ready().await {
                Ok(service) => service.call(ConsumeRequest::from(&record)).await,
                Err(e) => Err(e),
            };

            let reason = match response {
                Ok(ConsumeResponse::Ack) => match record.ack().await {
                    Ok(()) => {
                        acked += 1;
                        continue;
                    }
                    Err(e) => format!("failed to acknowledge record: {}", e),
                },
                Ok(ConsumeResponse::Nak(reason)) => {
                    reason.unwrap_or_else(|| "record rejected".to_string())
                }
                Err(e) => e.to_string(),
            };

            let mut pending = 0;
            for unsettled in std::iter::once(record).chain(records.by_ref()) {
                pending += 1;
                if let Err(e) = unsettled.nak().await {
                    // The server redelivers it after the ack wait expires
                    warn!(subject = %unsettled.subject, error = %e, "failed to return record to pending");
                }
            }

            warn!(
                stream = %self.settings.stream_name,
                instance = %self.settings.instance_name,
                acked,
                pending,
                reason = %reason,
                "halting batch, remaining records left pending"
            );
            return BatchOutcome::Halted {
                acked,
                pending,
                reason,
            };
        }

        BatchOutcome::Completed { acked }
    }
}
