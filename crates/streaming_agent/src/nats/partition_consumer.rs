use crate::domain::{
    CheckpointPolicy, CheckpointState, EventProcessor, PartitionState, ThroughputCounter,
};
use common::domain::DomainError;
use common::nats::{PartitionAssignment, PartitionConnector, PartitionSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PartitionConsumerConfig {
    pub batch_size: usize,
    pub receive_timeout: Duration,
    pub checkpoint: CheckpointPolicy,
}

/// Worker for a single partition.
///
/// Events are handed to the processor strictly in arrival order. After every
/// batch (empty ones included) the checkpoint state decides whether the
/// position is committed. Cancellation is only observed while waiting for a
/// batch, so a batch in hand is always finished.
pub struct PartitionConsumer {
    assignment: PartitionAssignment,
    connector: Arc<dyn PartitionConnector>,
    processor: Arc<dyn EventProcessor>,
    counter: Arc<ThroughputCounter>,
    config: PartitionConsumerConfig,
}

impl PartitionConsumer {
    pub fn new(
        assignment: PartitionAssignment,
        connector: Arc<dyn PartitionConnector>,
        processor: Arc<dyn EventProcessor>,
        counter: Arc<ThroughputCounter>,
        config: PartitionConsumerConfig,
    ) -> Self {
        Self {
            assignment,
            connector,
            processor,
            counter,
            config,
        }
    }

    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let partition_id = self.assignment.partition_id.clone();

        let Some(source) = self.open(&token).await else {
            info!(partition_id = %partition_id, "partition closed before it was opened");
            return Ok(());
        };

        let mut state = PartitionState::Opened;
        let mut checkpoint = CheckpointState::new(self.config.checkpoint, Instant::now());
        info!(partition_id = %partition_id, state = ?state, "partition opened");

        loop {
            let fetched = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                fetched = source.fetch_events(self.config.batch_size, self.config.receive_timeout) => fetched,
            };

            let events = match fetched {
                Ok(events) => events,
                Err(e) => {
                    error!(partition_id = %partition_id, error = %e, "partition receive failed");
                    if !sleep_or_cancel(&token, RETRY_DELAY).await {
                        break;
                    }
                    continue;
                }
            };

            state = PartitionState::Processing;
            let count = events.len() as u64;
            self.counter.add(count);
            if count > 0 {
                debug!(partition_id = %partition_id, count, "batch received");
            }

            for event in events {
                let sequence = event.sequence;
                match self.processor.process(event).await {
                    Ok(()) => {}
                    Err(DomainError::MalformedEvent(reason)) => {
                        warn!(partition_id = %partition_id, sequence, reason = %reason, "skipping malformed event");
                    }
                    Err(e) => {
                        error!(partition_id = %partition_id, sequence, error = %e, "event processing failed");
                    }
                }
            }

            checkpoint.record(count);
            if checkpoint.is_due(Instant::now()) {
                match source.checkpoint().await {
                    Ok(committed) => {
                        if committed {
                            info!(
                                partition_id = %partition_id,
                                messages = checkpoint.messages_since_last_checkpoint(),
                                "checkpoint committed"
                            );
                        }
                        checkpoint.reset(Instant::now());
                        state = PartitionState::Checkpointed;
                    }
                    Err(e) => {
                        error!(partition_id = %partition_id, error = %e, "checkpoint failed, will retry after next batch");
                    }
                }
            }
            debug!(partition_id = %partition_id, state = ?state, "batch done");
        }

        state = PartitionState::Closed;
        info!(partition_id = %partition_id, state = ?state, "partition closed");
        Ok(())
    }

    /// Retries until the partition opens; `None` if cancelled first.
    async fn open(&self, token: &CancellationToken) -> Option<Box<dyn PartitionSource>> {
        loop {
            let opened = tokio::select! {
                biased;
                _ = token.cancelled() => return None,
                opened = self.connector.open_partition(self.assignment.clone()) => opened,
            };

            match opened {
                Ok(source) => return Some(source),
                Err(e) => {
                    error!(
                        partition_id = %self.assignment.partition_id,
                        error = %e,
                        "failed to open partition, retrying"
                    );
                    if !sleep_or_cancel(token, RETRY_DELAY).await {
                        return None;
                    }
                }
            }
        }
    }
}

async fn sleep_or_cancel(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
