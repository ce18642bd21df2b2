use chrono::{DateTime, NaiveDateTime, Utc};
use common::domain::{CanonicalRecord, DomainError, DomainResult, PayloadValue, RawEvent};
use std::collections::HashMap;
use tracing::{debug, error, instrument};

pub const MESSAGE_SCHEMA_PROPERTY: &str = "$$MessageSchema";
pub const CONTENT_TYPE_PROPERTY: &str = "$$ContentType";
pub const CREATION_TIME_PROPERTY: &str = "$$CreationTimeUtc";
pub const DEVICE_ID_PROPERTY: &str = "iothub-connection-device-id";

/// Key a bare scalar body is stored under.
pub const SCALAR_PAYLOAD_KEY: &str = "value";

/// Transport keys never copied into record properties.
const RESERVED_PROPERTIES: &[&str] = &[
    MESSAGE_SCHEMA_PROPERTY,
    CONTENT_TYPE_PROPERTY,
    CREATION_TIME_PROPERTY,
    DEVICE_ID_PROPERTY,
    "iothub-connection-auth-method",
    "iothub-connection-auth-generation-id",
    "iothub-enqueuedtime",
    "iothub-message-source",
    "x-opt-sequence-number",
    "x-opt-offset",
    "x-opt-enqueued-time",
];

/// Converts raw broker events into canonical records.
///
/// Only the three identifying properties (device id, schema, creation time)
/// are hard requirements. Everything about the body degrades to an empty
/// payload instead of failing.
#[derive(Debug, Default, Clone)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, event: &RawEvent) -> DomainResult<CanonicalRecord> {
        self.normalize_at(event, Utc::now())
    }

    /// Normalize with an explicit receipt time.
    #[instrument(skip(self, event), fields(partition_id = %event.partition_id, sequence = event.sequence))]
    pub fn normalize_at(
        &self,
        event: &RawEvent,
        received_at: DateTime<Utc>,
    ) -> DomainResult<CanonicalRecord> {
        let device_id = required_property(event, DEVICE_ID_PROPERTY)?;
        let schema = required_property(event, MESSAGE_SCHEMA_PROPERTY)?;
        let created_raw = required_property(event, CREATION_TIME_PROPERTY)?;
        let create_time = parse_creation_time(created_raw)?;
        let content_type = event.property(CONTENT_TYPE_PROPERTY).unwrap_or_default();

        let properties: HashMap<String, String> = event
            .properties
            .iter()
            .filter(|(key, _)| !RESERVED_PROPERTIES.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let payload = if should_decode_json(content_type, schema, &event.body) {
            decode_payload(device_id, &event.body)
        } else {
            debug!(device_id = %device_id, content_type = %content_type, "body is not JSON, payload left empty");
            HashMap::new()
        };

        Ok(CanonicalRecord::new(
            device_id.to_string(),
            schema.to_string(),
            create_time,
            received_at.timestamp_millis(),
            properties,
            payload,
        ))
    }
}

fn required_property<'a>(event: &'a RawEvent, key: &str) -> DomainResult<&'a str> {
    event
        .property(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            DomainError::MalformedEvent(format!(
                "missing {} on partition {} sequence {}",
                key, event.partition_id, event.sequence
            ))
        })
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
fn parse_creation_time(value: &str) -> DomainResult<i64> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc).timestamp_millis());
    }

    value
        .parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|e| DomainError::MalformedEvent(format!("invalid creation time {value:?}: {e}")))
}

fn should_decode_json(content_type: &str, schema: &str, body: &[u8]) -> bool {
    let mentions_json = |s: &str| s.to_ascii_lowercase().contains("json");

    if mentions_json(content_type) || mentions_json(schema) {
        return true;
    }
    content_type.trim().is_empty() && body.contains(&b'{')
}

fn decode_payload(device_id: &str, body: &[u8]) -> HashMap<String, PayloadValue> {
    let mut payload = HashMap::new();

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            error!(device_id = %device_id, error = %e, "failed to parse JSON body, payload left empty");
            return payload;
        }
    };

    match value {
        serde_json::Value::Object(fields) => {
            for (key, field) in fields {
                match PayloadValue::from_json_scalar(field) {
                    Some(scalar) => {
                        payload.insert(key, scalar);
                    }
                    None => debug!(device_id = %device_id, field = %key, "dropping non-scalar field"),
                }
            }
        }
        other => {
            if let Some(scalar) = PayloadValue::from_json_scalar(other) {
                payload.insert(SCALAR_PAYLOAD_KEY.to_string(), scalar);
            } else {
                debug!(device_id = %device_id, "top-level JSON array ignored");
            }
        }
    }

    payload
}
