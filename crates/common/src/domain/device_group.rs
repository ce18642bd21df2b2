use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Resolves a device group to the ids of its current members
///
/// Implementations should:
/// - Return an empty list when the group does not exist
/// - Return `DomainError::RemoteDependency` on any other remote failure
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceGroupResolver: Send + Sync {
    async fn get_devices(&self, group_id: &str) -> DomainResult<Vec<String>>;
}
