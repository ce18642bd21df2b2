use crate::domain::{DeviceGroupResolver, DomainError, DomainResult};
use crate::http::client::{join_url, JsonHttpClient};
use crate::http::models::{DeviceGroupModel, DeviceModel, ItemList};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Resolves group membership in two calls: the group definition from the
/// device-groups service, then the device-service query built from its
/// conditions.
pub struct HttpDeviceGroupResolver {
    client: JsonHttpClient,
    groups_url: String,
    devices_url: String,
}

impl HttpDeviceGroupResolver {
    pub fn new(client: JsonHttpClient, groups_base_url: &str, devices_base_url: &str) -> Self {
        Self {
            client,
            groups_url: join_url(groups_base_url, "devicegroups"),
            devices_url: join_url(devices_base_url, "devices"),
        }
    }
}

#[async_trait]
impl DeviceGroupResolver for HttpDeviceGroupResolver {
    #[instrument(skip(self), fields(group_id = %group_id))]
    async fn get_devices(&self, group_id: &str) -> DomainResult<Vec<String>> {
        let group_url = join_url(&self.groups_url, group_id);
        let Some(group) = self
            .client
            .get_json::<DeviceGroupModel>(&group_url, &[], true)
            .await?
        else {
            debug!("device group not found, treating as empty");
            return Ok(Vec::new());
        };

        let query = serde_json::to_string(&group.conditions).map_err(|e| {
            DomainError::RemoteDependency(format!("failed to encode group query: {e}"))
        })?;

        let devices: Vec<String> = self
            .client
            .get_json::<ItemList<DeviceModel>>(&self.devices_url, &[("query", query.as_str())], false)
            .await?
            .map(|list| list.items.into_iter().map(|d| d.id).collect())
            .unwrap_or_default();

        debug!(device_count = devices.len(), "resolved device group");
        Ok(devices)
    }
}
