use common::postgres::StorageConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use streaming_agent::{CheckpointPolicy, StorageFailurePolicy, StreamingAgentConfig};

const SUPPORTED_CHECKPOINT_BACKEND: &str = "jetstream";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// JetStream stream holding the partitioned telemetry
    #[serde(default = "default_nats_stream")]
    pub nats_stream: String,

    /// Number of partitions; partition n is subject `<stream>.<n>`
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,

    /// Durable consumer name prefix
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Max events per receive
    #[serde(default = "default_receive_batch_size")]
    pub receive_batch_size: usize,

    /// Max wait for a receive in milliseconds
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,

    // Checkpoint configuration
    /// Where partition positions are committed (only `jetstream`)
    #[serde(default = "default_checkpoint_backend")]
    pub checkpoint_backend: String,

    #[serde(default = "default_checkpoint_count_threshold")]
    pub checkpoint_count_threshold: u64,

    #[serde(default = "default_checkpoint_time_threshold_secs")]
    pub checkpoint_time_threshold_secs: u64,

    /// Start point for partitions without a checkpoint, in hours before now
    #[serde(default = "default_initial_lookback_hours")]
    pub initial_lookback_hours: u64,

    // Remote services
    #[serde(default = "default_rules_url")]
    pub rules_url: String,

    #[serde(default = "default_device_groups_url")]
    pub device_groups_url: String,

    #[serde(default = "default_devices_url")]
    pub devices_url: String,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_group_cache_ttl_secs")]
    pub group_cache_ttl_secs: u64,

    #[serde(default = "default_rule_reload_interval_secs")]
    pub rule_reload_interval_secs: u64,

    #[serde(default = "default_throughput_report_interval_secs")]
    pub throughput_report_interval_secs: u64,

    // Storage configuration
    #[serde(default = "default_storage_connection_string")]
    pub messages_storage_connection_string: String,

    #[serde(default = "default_storage_database")]
    pub messages_storage_database: String,

    #[serde(default = "default_messages_storage_collection")]
    pub messages_storage_collection: String,

    #[serde(default = "default_storage_max_pool_size")]
    pub messages_storage_max_pool_size: usize,

    #[serde(default = "default_storage_connection_string")]
    pub alarms_storage_connection_string: String,

    #[serde(default = "default_storage_database")]
    pub alarms_storage_database: String,

    #[serde(default = "default_alarms_storage_collection")]
    pub alarms_storage_collection: String,

    #[serde(default = "default_storage_max_pool_size")]
    pub alarms_storage_max_pool_size: usize,

    /// What to do with a document the store rejects (drop, retry, dead_letter)
    #[serde(default = "default_storage_failure_policy")]
    pub storage_failure_policy: String,

    #[serde(default = "default_storage_retry_attempts")]
    pub storage_retry_attempts: u32,

    #[serde(default = "default_storage_retry_backoff_ms")]
    pub storage_retry_backoff_ms: u64,

    /// JetStream stream receiving dead-lettered documents
    #[serde(default = "default_dead_letter_stream")]
    pub dead_letter_stream: String,

    // Lifecycle
    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// How long processes may drain after shutdown is requested
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    // OpenTelemetry configuration
    /// OpenTelemetry OTLP endpoint (gRPC)
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Enable OpenTelemetry export
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name for OpenTelemetry resource
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_stream() -> String {
    "telemetry".to_string()
}

fn default_partition_count() -> u32 {
    4
}

fn default_consumer_group() -> String {
    "streaming-agent".to_string()
}

fn default_receive_batch_size() -> usize {
    100
}

fn default_receive_timeout_ms() -> u64 {
    5000
}

// Checkpoint defaults
fn default_checkpoint_backend() -> String {
    SUPPORTED_CHECKPOINT_BACKEND.to_string()
}

fn default_checkpoint_count_threshold() -> u64 {
    1000
}

fn default_checkpoint_time_threshold_secs() -> u64 {
    60
}

fn default_initial_lookback_hours() -> u64 {
    24
}

// Remote service defaults
fn default_rules_url() -> String {
    "http://localhost:8080/api/v1".to_string()
}

fn default_device_groups_url() -> String {
    "http://localhost:8080/api/v1".to_string()
}

fn default_devices_url() -> String {
    "http://localhost:8081/api/v1".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_group_cache_ttl_secs() -> u64 {
    300
}

fn default_rule_reload_interval_secs() -> u64 {
    60
}

fn default_throughput_report_interval_secs() -> u64 {
    30
}

// Storage defaults
fn default_storage_connection_string() -> String {
    StorageConfig::default().connection_string
}

fn default_storage_database() -> String {
    StorageConfig::default().database
}

fn default_messages_storage_collection() -> String {
    "messages".to_string()
}

fn default_alarms_storage_collection() -> String {
    "alarms".to_string()
}

fn default_storage_max_pool_size() -> usize {
    StorageConfig::default().max_pool_size
}

fn default_storage_failure_policy() -> String {
    "drop".to_string()
}

fn default_storage_retry_attempts() -> u32 {
    3
}

fn default_storage_retry_backoff_ms() -> u64 {
    500
}

fn default_dead_letter_stream() -> String {
    "telemetry_dead_letter".to_string()
}

// Lifecycle defaults
fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

// OpenTelemetry defaults
fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "streaming-agent".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("AGENT"))
            .build()?
            .try_deserialize()
    }

    /// Rejects settings the agent cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_backend != SUPPORTED_CHECKPOINT_BACKEND {
            return Err(invalid(format!(
                "unsupported checkpoint_backend '{}', only '{}' is available",
                self.checkpoint_backend, SUPPORTED_CHECKPOINT_BACKEND
            )));
        }
        if self.partition_count == 0 {
            return Err(invalid("partition_count must be at least 1"));
        }
        if self.receive_batch_size == 0 {
            return Err(invalid("receive_batch_size must be at least 1"));
        }
        if self.checkpoint_count_threshold == 0 || self.checkpoint_time_threshold_secs == 0 {
            return Err(invalid("checkpoint thresholds must be greater than zero"));
        }
        for (key, secs) in [
            ("rule_reload_interval_secs", self.rule_reload_interval_secs),
            (
                "throughput_report_interval_secs",
                self.throughput_report_interval_secs,
            ),
            ("group_cache_ttl_secs", self.group_cache_ttl_secs),
        ] {
            if secs == 0 {
                return Err(invalid(format!("{key} must be greater than zero")));
            }
        }

        for (key, url) in [
            ("rules_url", &self.rules_url),
            ("device_groups_url", &self.device_groups_url),
            ("devices_url", &self.devices_url),
            ("nats_url", &self.nats_url),
        ] {
            if url.trim().is_empty() {
                return Err(invalid(format!("{key} must not be empty")));
            }
        }

        self.storage_failure_policy()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }

    pub fn storage_failure_policy(&self) -> common::domain::DomainResult<StorageFailurePolicy> {
        StorageFailurePolicy::from_config(
            &self.storage_failure_policy,
            self.storage_retry_attempts,
            Duration::from_millis(self.storage_retry_backoff_ms),
        )
    }

    pub fn messages_storage(&self) -> StorageConfig {
        StorageConfig {
            connection_string: self.messages_storage_connection_string.clone(),
            database: self.messages_storage_database.clone(),
            collection: self.messages_storage_collection.clone(),
            max_pool_size: self.messages_storage_max_pool_size,
        }
    }

    pub fn alarms_storage(&self) -> StorageConfig {
        StorageConfig {
            connection_string: self.alarms_storage_connection_string.clone(),
            database: self.alarms_storage_database.clone(),
            collection: self.alarms_storage_collection.clone(),
            max_pool_size: self.alarms_storage_max_pool_size,
        }
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn streaming_agent(&self) -> StreamingAgentConfig {
        StreamingAgentConfig {
            stream_name: self.nats_stream.clone(),
            partition_count: self.partition_count,
            consumer_group: self.consumer_group.clone(),
            batch_size: self.receive_batch_size,
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            checkpoint: CheckpointPolicy {
                count_threshold: self.checkpoint_count_threshold,
                time_threshold: Duration::from_secs(self.checkpoint_time_threshold_secs),
            },
            initial_lookback: Duration::from_secs(
                self.initial_lookback_hours.saturating_mul(3600),
            ),
            rule_reload_interval: Duration::from_secs(self.rule_reload_interval_secs),
            throughput_report_interval: Duration::from_secs(self.throughput_report_interval_secs),
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Message(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests run serially and don't interfere with each other
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 4] = [
        "AGENT_LOG_LEVEL",
        "AGENT_PARTITION_COUNT",
        "AGENT_CHECKPOINT_BACKEND",
        "AGENT_STORAGE_FAILURE_POLICY",
    ];

    fn clear_env() {
        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            for var in VARS {
                std::env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.checkpoint_count_threshold, 1000);
        assert_eq!(config.checkpoint_time_threshold_secs, 60);
        assert_eq!(config.group_cache_ttl_secs, 300);
        assert!(config.validate().is_ok());

        let agent = config.streaming_agent();
        assert_eq!(agent.checkpoint.time_threshold, Duration::from_secs(60));
        assert_eq!(agent.initial_lookback, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("AGENT_LOG_LEVEL", "debug");
            std::env::set_var("AGENT_PARTITION_COUNT", "8");
        }

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.partition_count, 8);

        clear_env();
    }

    #[test]
    fn test_unsupported_checkpoint_backend_is_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        // SAFETY: Test runs with mutex lock to prevent concurrent env access
        unsafe {
            std::env::set_var("AGENT_CHECKPOINT_BACKEND", "blob");
        }

        let config = ServiceConfig::from_env().unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("checkpoint_backend"));

        clear_env();
    }

    #[test]
    fn test_zero_partitions_and_unknown_policy_are_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();
        let base = ServiceConfig::from_env().unwrap();

        let mut zero_partitions = base.clone();
        zero_partitions.partition_count = 0;
        assert!(zero_partitions.validate().is_err());

        let mut unknown_policy = base.clone();
        unknown_policy.storage_failure_policy = "shrug".to_string();
        assert!(unknown_policy.validate().is_err());

        let mut empty_url = base;
        empty_url.rules_url = "  ".to_string();
        assert!(empty_url.validate().is_err());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();
        let base = ServiceConfig::from_env().unwrap();

        let mut zero_reload = base.clone();
        zero_reload.rule_reload_interval_secs = 0;
        let err = zero_reload.validate().unwrap_err();
        assert!(err.to_string().contains("rule_reload_interval_secs"));

        let mut zero_report = base.clone();
        zero_report.throughput_report_interval_secs = 0;
        let err = zero_report.validate().unwrap_err();
        assert!(err.to_string().contains("throughput_report_interval_secs"));

        let mut zero_ttl = base;
        zero_ttl.group_cache_ttl_secs = 0;
        let err = zero_ttl.validate().unwrap_err();
        assert!(err.to_string().contains("group_cache_ttl_secs"));
    }

    #[test]
    fn test_huge_lookback_saturates() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();
        let mut config = ServiceConfig::from_env().unwrap();
        config.initial_lookback_hours = u64::MAX;

        let agent = config.streaming_agent();

        assert_eq!(agent.initial_lookback, Duration::from_secs(u64::MAX));
    }
}
