use async_trait::async_trait;
use common::domain::{DeviceGroupResolver, DomainResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

pub const DEFAULT_GROUP_CACHE_TTL: Duration = Duration::from_secs(300);

/// Answers whether a device belongs to a device group
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GroupMembership: Send + Sync {
    async fn is_member(&self, device_id: &str, group_id: &str) -> DomainResult<bool>;
}

struct CacheEntry {
    device_ids: HashSet<String>,
    expires_at: Instant,
}

/// Time-bounded group membership cache, refreshed lazily per group.
///
/// One lock covers the whole map and stays held across the resolver call, so
/// concurrent refreshes are serialized.
pub struct DeviceGroupCache {
    resolver: Arc<dyn DeviceGroupResolver>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DeviceGroupCache {
    pub fn new(resolver: Arc<dyn DeviceGroupResolver>, ttl: Duration) -> Self {
        Self {
            resolver,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl GroupMembership for DeviceGroupCache {
    #[instrument(skip(self), fields(device_id = %device_id, group_id = %group_id))]
    async fn is_member(&self, device_id: &str, group_id: &str) -> DomainResult<bool> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries
            .get(group_id)
            .is_some_and(|entry| now > entry.expires_at)
        {
            debug!("device group entry expired");
            entries.remove(group_id);
        }

        if let Some(entry) = entries.get(group_id) {
            return Ok(entry.device_ids.contains(device_id));
        }

        let device_ids: HashSet<String> =
            self.resolver.get_devices(group_id).await?.into_iter().collect();
        debug!(device_count = device_ids.len(), "device group refreshed");

        let is_member = device_ids.contains(device_id);
        entries.insert(
            group_id.to_string(),
            CacheEntry {
                device_ids,
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(is_member)
    }
}
