use crate::domain::message_orchestrator::MessageOrchestrator;
use crate::domain::throughput_counter::{ThroughputCounter, ThroughputSampler};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_RULE_RELOAD_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_THROUGHPUT_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Waits for `interval`; false if cancelled first.
async fn wait_or_cancel(token: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

/// Periodically reloads the active rule set until cancelled.
pub struct RuleReloader {
    orchestrator: Arc<MessageOrchestrator>,
    interval: Duration,
}

impl RuleReloader {
    pub fn new(orchestrator: Arc<MessageOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        info!(interval_secs = self.interval.as_secs(), "rule reloader started");

        while wait_or_cancel(&token, self.interval).await {
            // Failures are logged inside reload and the previous rules stay active.
            let _ = self.orchestrator.reload().await;
        }

        info!("rule reloader stopped");
        Ok(())
    }
}

/// Periodically logs the processing rate until cancelled.
pub struct ThroughputReporter {
    counter: Arc<ThroughputCounter>,
    interval: Duration,
}

impl ThroughputReporter {
    pub fn new(counter: Arc<ThroughputCounter>, interval: Duration) -> Self {
        Self { counter, interval }
    }

    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let mut sampler = ThroughputSampler::new();
        sampler.sample(self.counter.total(), Instant::now());

        while wait_or_cancel(&token, self.interval).await {
            let total = self.counter.total();
            match sampler.sample(total, Instant::now()) {
                Some(rate) => info!(
                    total_processed = total,
                    events_per_second = rate,
                    "throughput"
                ),
                None => debug!("throughput baseline recorded"),
            }
        }

        debug!("throughput reporter stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alarm_generator::AlarmGenerator;
    use crate::domain::device_group_cache::MockGroupMembership;
    use crate::domain::record_normalizer::RecordNormalizer;
    use crate::domain::rules_evaluation::RulesEvaluation;
    use crate::domain::storage_writer::{StorageFailurePolicy, StorageWriter};
    use common::domain::{DomainError, MockDocumentStore, MockRuleSource, RuleDefinition};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(rules: MockRuleSource) -> Arc<MessageOrchestrator> {
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
            Arc::new(rules),
        ))
    }

    fn enabled_rule(id: &str) -> RuleDefinition {
        RuleDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            severity: "info".to_string(),
            group_id: "chillers".to_string(),
            enabled: true,
            conditions: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rule_reloader_reloads_each_interval_and_survives_failures() {
        // Arrange
        let calls = Arc::new(AtomicUsize::new(0));
        let mut rules = MockRuleSource::new();
        rules.expect_get_all().returning({
            let calls = calls.clone();
            move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(DomainError::RemoteDependency("rules service down".to_string()))
                } else {
                    Ok(vec![enabled_rule("rule-1")])
                }
            }
        });
        let orchestrator = orchestrator(rules);
        let token = CancellationToken::new();
        let reloader = RuleReloader::new(orchestrator.clone(), Duration::from_secs(60));
        let handle = tokio::spawn(reloader.run(token.clone()));

        // Act
        tokio::time::sleep(Duration::from_secs(125)).await;
        token.cancel();
        let result = handle.await.unwrap();

        // Assert
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.active_rules().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rule_reloader_exits_promptly_on_cancel() {
        let mut rules = MockRuleSource::new();
        rules.expect_get_all().times(0);
        let token = CancellationToken::new();
        let reloader = RuleReloader::new(orchestrator(rules), Duration::from_secs(60));

        token.cancel();
        let result = reloader.run(token).await;

        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_reporter_stops_on_cancel() {
        let counter = Arc::new(ThroughputCounter::new());
        let token = CancellationToken::new();
        let reporter = ThroughputReporter::new(counter.clone(), Duration::from_secs(30));
        let handle = tokio::spawn(reporter.run(token.clone()));

        counter.add(300);
        tokio::time::sleep(Duration::from_secs(65)).await;
        token.cancel();

        assert!(handle.await.unwrap().is_ok());
    }
}
