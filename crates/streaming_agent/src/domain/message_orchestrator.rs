use crate::domain::alarm_generator::AlarmGenerator;
use crate::domain::documents::record_document;
use crate::domain::record_normalizer::RecordNormalizer;
use crate::domain::rules_evaluation::RulesEvaluation;
use crate::domain::storage_writer::StorageWriter;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use common::domain::{DomainResult, RawEvent, RuleDefinition, RuleSource};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Handles one raw event from a partition
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Errors are per event; the caller logs them and moves on
    async fn process(&self, event: RawEvent) -> DomainResult<()>;
}

/// Per-record pipeline: normalize, persist, evaluate every active rule, emit
/// alarms for matches.
///
/// The active rule set is an immutable snapshot swapped wholesale on reload.
pub struct MessageOrchestrator {
    normalizer: RecordNormalizer,
    records: Arc<StorageWriter>,
    evaluation: RulesEvaluation,
    alarms: AlarmGenerator,
    rule_source: Arc<dyn RuleSource>,
    active_rules: ArcSwap<Vec<RuleDefinition>>,
}

impl MessageOrchestrator {
    pub fn new(
        normalizer: RecordNormalizer,
        records: Arc<StorageWriter>,
        evaluation: RulesEvaluation,
        alarms: AlarmGenerator,
        rule_source: Arc<dyn RuleSource>,
    ) -> Self {
        Self {
            normalizer,
            records,
            evaluation,
            alarms,
            rule_source,
            active_rules: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Snapshot of the active rules.
    pub fn active_rules(&self) -> Arc<Vec<RuleDefinition>> {
        self.active_rules.load_full()
    }

    /// Re-fetch rules and swap in the enabled ones.
    ///
    /// On failure the previous set stays active and the error is returned.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> DomainResult<usize> {
        let rules = match self.rule_source.get_all().await {
            Ok(rules) => rules,
            Err(e) => {
                error!(
                    error = %e,
                    active_rules = self.active_rules.load().len(),
                    "rule reload failed, keeping previous rules"
                );
                return Err(e);
            }
        };

        let fetched = rules.len();
        let enabled: Vec<RuleDefinition> = rules.into_iter().filter(|r| r.enabled).collect();
        let active = enabled.len();
        self.active_rules.store(Arc::new(enabled));

        info!(fetched, active, "rules reloaded");
        Ok(active)
    }
}

#[async_trait]
impl EventProcessor for MessageOrchestrator {
    #[instrument(skip(self, event), fields(partition_id = %event.partition_id, sequence = event.sequence))]
    async fn process(&self, event: RawEvent) -> DomainResult<()> {
        let record = self.normalizer.normalize(&event)?;
        debug!(
            record_id = %record.id(),
            device_id = %record.device_id(),
            payload_fields = record.payload().len(),
            "record normalized"
        );

        self.records.write(&record_document(&record)).await;

        let rules = self.active_rules.load_full();
        for rule in rules.iter() {
            match self.evaluation.evaluate(rule, &record).await {
                Ok(result) if result.matched => {
                    let alarm = self.alarms.build_alarm(rule, &record, result.message);
                    self.alarms.emit(&alarm).await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        rule_id = %rule.id,
                        device_id = %record.device_id(),
                        error = %e,
                        "rule evaluation failed"
                    );
                }
            }
        }

        Ok(())
    }
}
