use crate::domain::device_group_cache::GroupMembership;
use crate::domain::operator::ComparisonOperator;
use common::domain::{CanonicalRecord, Condition, DomainResult, PayloadValue, RuleDefinition};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// What rule evaluation reads from a record.
pub trait EvaluationSubject: Send + Sync {
    fn device_id(&self) -> &str;
    fn payload_field(&self, field: &str) -> Option<&PayloadValue>;
}

impl EvaluationSubject for CanonicalRecord {
    fn device_id(&self) -> &str {
        CanonicalRecord::device_id(self)
    }

    fn payload_field(&self, field: &str) -> Option<&PayloadValue> {
        CanonicalRecord::payload_field(self, field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub matched: bool,
    /// Only meaningful when `matched`.
    pub message: String,
}

impl EvaluationResult {
    fn no_match() -> Self {
        Self {
            matched: false,
            message: String::new(),
        }
    }
}

/// Evaluates one rule against one record.
///
/// Group membership is checked first; a non-member never has its payload
/// read. Conditions form a conjunction and stop at the first failure.
pub struct RulesEvaluation {
    membership: Arc<dyn GroupMembership>,
}

impl RulesEvaluation {
    pub fn new(membership: Arc<dyn GroupMembership>) -> Self {
        Self { membership }
    }

    #[instrument(skip(self, rule, subject), fields(rule_id = %rule.id, device_id = %subject.device_id()))]
    pub async fn evaluate<S: EvaluationSubject>(
        &self,
        rule: &RuleDefinition,
        subject: &S,
    ) -> DomainResult<EvaluationResult> {
        if !self
            .membership
            .is_member(subject.device_id(), &rule.group_id)
            .await?
        {
            debug!(group_id = %rule.group_id, "device not in rule group");
            return Ok(EvaluationResult::no_match());
        }

        let mut descriptions = Vec::with_capacity(rule.conditions.len());
        for condition in &rule.conditions {
            match evaluate_condition(condition, subject) {
                Some(description) => descriptions.push(description),
                None => return Ok(EvaluationResult::no_match()),
            }
        }

        Ok(EvaluationResult {
            matched: true,
            message: descriptions.join("; "),
        })
    }
}

/// Returns the match description, or `None` when the condition fails.
fn evaluate_condition<S: EvaluationSubject>(condition: &Condition, subject: &S) -> Option<String> {
    let Some(value) = subject.payload_field(&condition.field) else {
        debug!(field = %condition.field, "field missing from payload");
        return None;
    };

    let Some(operator) = ComparisonOperator::parse(&condition.operator) else {
        error!(field = %condition.field, operator = %condition.operator, "unknown comparison operator");
        return None;
    };

    let (held, actual) = match value {
        PayloadValue::Numeric(number) => {
            let Some(actual) = number.as_f64() else {
                warn!(field = %condition.field, "numeric value not representable as f64");
                return None;
            };
            let Ok(expected) = condition.value.trim().parse::<f64>() else {
                warn!(
                    field = %condition.field,
                    value = %condition.value,
                    "condition value is not numeric"
                );
                return None;
            };
            (operator.compare_numbers(actual, expected), number.to_string())
        }
        PayloadValue::Text(text) => (operator.compare_text(text, &condition.value), text.clone()),
        PayloadValue::Unsupported(_) => {
            warn!(
                field = %condition.field,
                value_type = value.type_name(),
                "unsupported value type in condition"
            );
            return None;
        }
    };

    held.then(|| {
        format!(
            "`{}` value `{}` is {} `{}`",
            condition.field,
            actual,
            operator.phrase(),
            condition.value
        )
    })
}
