use crate::domain::RawEvent;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Everything needed to attach a durable consumer to one stream partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionAssignment {
    pub stream_name: String,
    pub partition_id: String,
    pub consumer_name: String,
    pub filter_subject: String,
    /// Where a brand-new consumer starts; ignored when a checkpoint exists.
    pub initial_start_time: DateTime<Utc>,
    pub ack_wait: Duration,
    pub max_ack_pending: i64,
}

/// Trait for attaching to stream partitions
/// Abstracts durable consumer lookup/creation on NATS JetStream
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PartitionConnector: Send + Sync {
    /// Resume the partition's durable consumer, or create it at the assignment's
    /// initial start time when no checkpoint exists yet
    async fn open_partition(&self, assignment: PartitionAssignment)
        -> Result<Box<dyn PartitionSource>>;
}

/// Trait for one partition's event source
/// Abstracts batch fetch and checkpoint commit
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PartitionSource: Send + Sync {
    /// Fetch events in partition order
    /// Returns up to max_events, waiting up to expires duration (possibly none)
    async fn fetch_events(&self, max_events: usize, expires: Duration) -> Result<Vec<RawEvent>>;

    /// Commit the position of the last fetched event
    /// Returns false when nothing new was fetched since the previous commit
    async fn checkpoint(&self) -> Result<bool>;
}

/// Trait for JetStream publisher operations
/// Abstracts the acknowledged publish used for dead-lettering
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait JetStreamPublisher: Send + Sync {
    /// Publish a message to a subject and await acknowledgment
    async fn publish(&self, subject: String, payload: bytes::Bytes) -> Result<()>;
}
