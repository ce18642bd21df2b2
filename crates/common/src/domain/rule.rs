use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// A single field comparison; all conditions of a rule must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub operator: String,
    pub value: String,
}

/// Monitoring rule scoped to a device group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: String,
    pub group_id: String,
    pub enabled: bool,
    pub conditions: Vec<Condition>,
}

/// Source of rule definitions (remote rules service)
///
/// Implementations should:
/// - Return every rule, enabled or not; filtering is up to the caller
/// - Return `DomainError::RemoteDependency` when the service is unreachable or
///   answers with an unexpected status
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn get_all(&self) -> DomainResult<Vec<RuleDefinition>>;
}
