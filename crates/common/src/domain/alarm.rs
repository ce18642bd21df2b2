use chrono::{DateTime, Utc};

pub const NEW_ALARM_STATUS: &str = "open";

/// Alarm raised by one rule matching one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Alarm {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub status: String,
    pub device_id: String,
    pub message_received_time: i64,
    pub description: String,
    pub rule_id: String,
    pub rule_severity: String,
    pub rule_description: String,
}
