use crate::domain::RawEvent;
use crate::nats::traits::{PartitionAssignment, PartitionConnector, PartitionSource};
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, consumer::DeliverPolicy};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

/// Connects partitions to durable JetStream pull consumers.
///
/// The consumer uses `AckPolicy::All`, so acknowledging the newest delivered
/// message commits the partition position. A consumer that already exists is
/// resumed from its ack floor; a new one starts at the assignment's initial
/// start time.
pub struct NatsPartitionConnector {
    context: jetstream::Context,
}

impl NatsPartitionConnector {
    pub fn new(context: jetstream::Context) -> Self {
        Self { context }
    }
}

#[async_trait]
impl PartitionConnector for NatsPartitionConnector {
    #[instrument(skip(self, assignment), fields(partition_id = %assignment.partition_id, consumer = %assignment.consumer_name))]
    async fn open_partition(
        &self,
        assignment: PartitionAssignment,
    ) -> Result<Box<dyn PartitionSource>> {
        let existing = self
            .context
            .get_consumer_from_stream::<pull::Config, _, _>(
                &assignment.consumer_name,
                &assignment.stream_name,
            )
            .await;

        let consumer = match existing {
            Ok(consumer) => {
                info!("Resuming partition from existing checkpoint");
                consumer
            }
            Err(e) => {
                debug!(error = %e, "No existing consumer, starting from initial position");
                let start_time =
                    time::OffsetDateTime::from_unix_timestamp(assignment.initial_start_time.timestamp())
                        .context("Initial start time out of range")?;

                let config = pull::Config {
                    durable_name: Some(assignment.consumer_name.clone()),
                    filter_subject: assignment.filter_subject.clone(),
                    deliver_policy: DeliverPolicy::ByStartTime { start_time },
                    ack_policy: AckPolicy::All,
                    ack_wait: assignment.ack_wait,
                    max_ack_pending: assignment.max_ack_pending,
                    ..Default::default()
                };

                let consumer = self
                    .context
                    .create_consumer_on_stream(config, &assignment.stream_name)
                    .await
                    .context("Failed to create consumer")?;
                info!(start_time = %assignment.initial_start_time, "Created partition consumer");
                consumer
            }
        };

        Ok(Box::new(NatsPartitionSource::new(
            assignment.partition_id,
            consumer,
        )))
    }
}

/// One partition backed by a durable pull consumer.
pub struct NatsPartitionSource {
    partition_id: String,
    consumer: jetstream::consumer::PullConsumer,
    last_delivered: Mutex<Option<jetstream::Message>>,
}

impl NatsPartitionSource {
    pub fn new(partition_id: String, consumer: jetstream::consumer::PullConsumer) -> Self {
        Self {
            partition_id,
            consumer,
            last_delivered: Mutex::new(None),
        }
    }

    fn to_raw_event(&self, message: &jetstream::Message) -> RawEvent {
        let sequence = message
            .info()
            .map(|info| info.stream_sequence)
            .unwrap_or_default();

        RawEvent {
            partition_id: self.partition_id.clone(),
            sequence,
            properties: headers_to_properties(message.headers.as_ref()),
            body: message.payload.clone(),
        }
    }
}

#[async_trait]
impl PartitionSource for NatsPartitionSource {
    async fn fetch_events(&self, max_events: usize, expires: Duration) -> Result<Vec<RawEvent>> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(max_events)
            .expires(expires)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        let mut events = Vec::new();
        let mut newest = None;
        while let Some(msg) = messages.next().await {
            match msg {
                Ok(message) => {
                    events.push(self.to_raw_event(&message));
                    newest = Some(message);
                }
                Err(e) => {
                    error!(partition_id = %self.partition_id, error = %e, "Error receiving message");
                }
            }
        }

        if let Some(message) = newest {
            *self.last_delivered.lock().await = Some(message);
        }

        Ok(events)
    }

    async fn checkpoint(&self) -> Result<bool> {
        let mut last = self.last_delivered.lock().await;
        let Some(message) = last.as_ref() else {
            return Ok(false);
        };

        message
            .ack()
            .await
            .map_err(|e| anyhow!("Failed to acknowledge partition position: {}", e))?;
        *last = None;
        Ok(true)
    }
}

/// Flattens transport headers into event properties, first value wins.
fn headers_to_properties(headers: Option<&async_nats::HeaderMap>) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    if let Some(headers) = headers {
        for (name, values) in headers.iter() {
            if let Some(value) = values.first() {
                properties.insert(name.to_string(), value.to_string());
            }
        }
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_to_properties_copies_every_header() {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("iothub-connection-device-id", "device-1");
        headers.insert("$$MessageSchema", "temperature;v1");
        headers.append("x-custom", "first");
        headers.append("x-custom", "second");

        let properties = headers_to_properties(Some(&headers));

        assert_eq!(properties.len(), 3);
        assert_eq!(properties["iothub-connection-device-id"], "device-1");
        assert_eq!(properties["$$MessageSchema"], "temperature;v1");
        assert_eq!(properties["x-custom"], "first");
    }

    #[test]
    fn test_headers_to_properties_without_headers() {
        assert!(headers_to_properties(None).is_empty());
    }
}
