use crate::domain::{
    CheckpointPolicy, EventProcessor, MessageOrchestrator, RuleReloader, ThroughputCounter,
    ThroughputReporter,
};
use crate::nats::{PartitionConsumer, PartitionConsumerConfig};
use agent_runner::{BoxedTask, NamedProcess};
use chrono::{DateTime, Utc};
use common::nats::{PartitionAssignment, PartitionConnector};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StreamingAgentConfig {
    pub stream_name: String,
    pub partition_count: u32,
    pub consumer_group: String,
    pub batch_size: usize,
    pub receive_timeout: Duration,
    pub checkpoint: CheckpointPolicy,
    /// How far back a partition without a checkpoint starts reading.
    pub initial_lookback: Duration,
    pub rule_reload_interval: Duration,
    pub throughput_report_interval: Duration,
}

impl StreamingAgentConfig {
    /// One assignment per partition, `<stream>.<n>` consumed by `<group>-p<n>`.
    pub fn partition_assignments(&self, now: DateTime<Utc>) -> Vec<PartitionAssignment> {
        // Lookbacks reaching before the Unix epoch start there.
        let epoch = DateTime::<Utc>::default();
        let initial_start_time = chrono::Duration::from_std(self.initial_lookback)
            .ok()
            .and_then(|lookback| now.checked_sub_signed(lookback))
            .map_or(epoch, |start| start.max(epoch));
        // AckPolicy::All acks cumulatively, so up to a full checkpoint interval
        // plus one batch is unacked at any time.
        let max_ack_pending = self
            .checkpoint
            .count_threshold
            .saturating_add(2 * self.batch_size as u64)
            .min(i64::MAX as u64) as i64;

        (0..self.partition_count)
            .map(|n| PartitionAssignment {
                stream_name: self.stream_name.clone(),
                partition_id: n.to_string(),
                consumer_name: format!("{}-p{}", self.consumer_group, n),
                filter_subject: format!("{}.{}", self.stream_name, n),
                initial_start_time,
                ack_wait: self.checkpoint.time_threshold * 2,
                max_ack_pending,
            })
            .collect()
    }
}

/// The running agent: one worker per partition plus the two periodic tasks.
pub struct StreamingAgent {
    consumers: Vec<PartitionConsumer>,
    rule_reloader: RuleReloader,
    throughput_reporter: ThroughputReporter,
}

impl StreamingAgent {
    pub fn new(
        config: StreamingAgentConfig,
        connector: Arc<dyn PartitionConnector>,
        orchestrator: Arc<MessageOrchestrator>,
    ) -> Self {
        debug!(
            stream = %config.stream_name,
            partitions = config.partition_count,
            consumer_group = %config.consumer_group,
            "initializing streaming agent"
        );

        let counter = Arc::new(ThroughputCounter::new());
        let processor: Arc<dyn EventProcessor> = orchestrator.clone();
        let consumer_config = PartitionConsumerConfig {
            batch_size: config.batch_size,
            receive_timeout: config.receive_timeout,
            checkpoint: config.checkpoint,
        };

        let consumers = config
            .partition_assignments(Utc::now())
            .into_iter()
            .map(|assignment| {
                PartitionConsumer::new(
                    assignment,
                    Arc::clone(&connector),
                    Arc::clone(&processor),
                    Arc::clone(&counter),
                    consumer_config.clone(),
                )
            })
            .collect();

        Self {
            consumers,
            rule_reloader: RuleReloader::new(orchestrator, config.rule_reload_interval),
            throughput_reporter: ThroughputReporter::new(
                counter,
                config.throughput_report_interval,
            ),
        }
    }

    pub fn into_runner_processes(self) -> Vec<NamedProcess> {
        let mut processes: Vec<NamedProcess> = self
            .consumers
            .into_iter()
            .enumerate()
            .map(|(n, consumer)| NamedProcess {
                name: format!("partition-{}", n),
                process: Box::new(move |ctx| -> BoxedTask {
                    Box::pin(async move { consumer.run(ctx).await })
                }),
            })
            .collect();

        let rule_reloader = self.rule_reloader;
        processes.push(NamedProcess {
            name: "rule-reloader".to_string(),
            process: Box::new(move |ctx| -> BoxedTask {
                Box::pin(async move { rule_reloader.run(ctx).await })
            }),
        });

        let throughput_reporter = self.throughput_reporter;
        processes.push(NamedProcess {
            name: "throughput-reporter".to_string(),
            process: Box::new(move |ctx| -> BoxedTask {
                Box::pin(async move { throughput_reporter.run(ctx).await })
            }),
        });

        processes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AlarmGenerator, MockGroupMembership, RecordNormalizer, RulesEvaluation,
        StorageFailurePolicy, StorageWriter,
    };
    use chrono::TimeZone;
    use common::domain::{MockDocumentStore, MockRuleSource};
    use common::nats::MockPartitionConnector;

    fn config() -> StreamingAgentConfig {
        StreamingAgentConfig {
            stream_name: "telemetry".to_string(),
            partition_count: 3,
            consumer_group: "alarms-agent".to_string(),
            batch_size: 100,
            receive_timeout: Duration::from_secs(5),
            checkpoint: CheckpointPolicy {
                count_threshold: 1_000,
                time_threshold: Duration::from_secs(60),
            },
            initial_lookback: Duration::from_secs(3_600),
            rule_reload_interval: Duration::from_secs(60),
            throughput_report_interval: Duration::from_secs(30),
        }
    }

    fn orchestrator() -> Arc<MessageOrchestrator> {
        let writer = |kind: &str| {
            Arc::new(
                StorageWriter::new(
                    kind,
                    Arc::new(MockDocumentStore::new()),
                    StorageFailurePolicy::Drop,
                    None,
                )
                .unwrap(),
            )
        };
        Arc::new(MessageOrchestrator::new(
            RecordNormalizer::new(),
            writer("messages"),
            RulesEvaluation::new(Arc::new(MockGroupMembership::new())),
            AlarmGenerator::new(writer("alarms")),
            Arc::new(MockRuleSource::new()),
        ))
    }

    #[test]
    fn test_partition_assignments() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let assignments = config().partition_assignments(now);

        assert_eq!(assignments.len(), 3);
        let second = &assignments[1];
        assert_eq!(second.partition_id, "1");
        assert_eq!(second.consumer_name, "alarms-agent-p1");
        assert_eq!(second.filter_subject, "telemetry.1");
        assert_eq!(
            second.initial_start_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap()
        );
        assert_eq!(second.ack_wait, Duration::from_secs(120));
        assert_eq!(second.max_ack_pending, 1_200);
    }

    #[test]
    fn test_huge_lookback_starts_at_unix_epoch() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut config = config();
        config.initial_lookback = Duration::from_secs(u64::MAX);

        let assignments = config.partition_assignments(now);

        assert_eq!(assignments.len(), 3);
        assert!(assignments
            .iter()
            .all(|a| a.initial_start_time == Utc.timestamp_opt(0, 0).unwrap()));
    }

    #[test]
    fn test_runner_processes_are_named() {
        let agent = StreamingAgent::new(
            config(),
            Arc::new(MockPartitionConnector::new()),
            orchestrator(),
        );

        let names: Vec<String> = agent
            .into_runner_processes()
            .into_iter()
            .map(|p| p.name)
            .collect();

        assert_eq!(
            names,
            vec![
                "partition-0",
                "partition-1",
                "partition-2",
                "rule-reloader",
                "throughput-reporter"
            ]
        );
    }
}
