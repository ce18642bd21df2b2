use crate::domain::documents::alarm_document;
use crate::domain::storage_writer::{StorageWriter, WriteOutcome};
use chrono::Utc;
use common::domain::{Alarm, CanonicalRecord, RuleDefinition, NEW_ALARM_STATUS};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Builds alarms from rule matches and writes them to the alarm store.
///
/// Every call produces a new alarm id; redelivered records raise the alarm again.
pub struct AlarmGenerator {
    writer: Arc<StorageWriter>,
}

impl AlarmGenerator {
    pub fn new(writer: Arc<StorageWriter>) -> Self {
        Self { writer }
    }

    pub fn build_alarm(
        &self,
        rule: &RuleDefinition,
        record: &CanonicalRecord,
        match_message: String,
    ) -> Alarm {
        let now = Utc::now();
        Alarm {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            modified_at: now,
            status: NEW_ALARM_STATUS.to_string(),
            device_id: record.device_id().to_string(),
            message_received_time: record.received_time(),
            description: match_message,
            rule_id: rule.id.clone(),
            rule_severity: rule.severity.clone(),
            rule_description: rule.description.clone(),
        }
    }

    #[instrument(skip(self, alarm), fields(alarm_id = %alarm.id, rule_id = %alarm.rule_id, device_id = %alarm.device_id))]
    pub async fn emit(&self, alarm: &Alarm) -> WriteOutcome {
        let outcome = self.writer.write(&alarm_document(alarm)).await;
        info!(
            severity = %alarm.rule_severity,
            description = %alarm.description,
            outcome = ?outcome,
            "alarm raised"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::storage_writer::StorageFailurePolicy;
    use common::domain::MockDocumentStore;
    use std::collections::HashMap;

    fn rule() -> RuleDefinition {
        RuleDefinition {
            id: "rule-1".to_string(),
            name: "Chiller too hot".to_string(),
            description: "Temperature above limit".to_string(),
            severity: "critical".to_string(),
            group_id: "chillers".to_string(),
            enabled: true,
            conditions: vec![],
        }
    }

    fn record() -> CanonicalRecord {
        CanonicalRecord::new(
            "chiller-01".to_string(),
            "chiller-sensors;v1".to_string(),
            1_000,
            2_000,
            HashMap::new(),
            HashMap::new(),
        )
    }

    fn generator(store: MockDocumentStore) -> AlarmGenerator {
        let writer =
            StorageWriter::new("alarms", Arc::new(store), StorageFailurePolicy::Drop, None).unwrap();
        AlarmGenerator::new(Arc::new(writer))
    }

    #[test]
    fn test_build_alarm_copies_rule_and_record() {
        let generator = generator(MockDocumentStore::new());

        let alarm = generator.build_alarm(&rule(), &record(), "matched".to_string());

        assert_eq!(alarm.status, "open");
        assert_eq!(alarm.created_at, alarm.modified_at);
        assert_eq!(alarm.device_id, "chiller-01");
        assert_eq!(alarm.message_received_time, 2_000);
        assert_eq!(alarm.rule_id, "rule-1");
        assert_eq!(alarm.rule_severity, "critical");
        assert_eq!(alarm.rule_description, "Temperature above limit");
        assert_eq!(alarm.description, "matched");
        assert!(Uuid::parse_str(&alarm.id).is_ok());
    }

    #[test]
    fn test_each_alarm_gets_a_fresh_id() {
        let generator = generator(MockDocumentStore::new());

        let first = generator.build_alarm(&rule(), &record(), "matched".to_string());
        let second = generator.build_alarm(&rule(), &record(), "matched".to_string());

        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_emit_writes_alarm_document() {
        // Arrange
        let mut store = MockDocumentStore::new();
        store
            .expect_write()
            .withf(|doc| {
                doc.get("doc.schema") == Some(&serde_json::json!("alarm"))
                    && doc.get("rule.id") == Some(&serde_json::json!("rule-1"))
            })
            .times(1)
            .returning(|_| Ok(()));
        let generator = generator(store);
        let alarm = generator.build_alarm(&rule(), &record(), "matched".to_string());

        // Act
        let outcome = generator.emit(&alarm).await;

        // Assert
        assert_eq!(outcome, WriteOutcome::Stored);
    }
}
