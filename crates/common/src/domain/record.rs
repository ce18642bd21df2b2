use bytes::Bytes;
use std::collections::HashMap;

/// One event as delivered by the broker for a single partition.
///
/// `properties` holds every transport header verbatim, reserved keys included.
/// Normalization decides which of them become record metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub partition_id: String,
    pub sequence: u64,
    pub properties: HashMap<String, String>,
    pub body: Bytes,
}

impl RawEvent {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// A decoded payload field, classified once at decode time.
///
/// Only `Numeric` and `Text` take part in rule comparisons. Booleans and
/// nulls are kept as `Unsupported` so they are still persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Numeric(serde_json::Number),
    Text(String),
    Unsupported(serde_json::Value),
}

impl PayloadValue {
    /// Classify a JSON scalar. Returns `None` for objects and arrays.
    pub fn from_json_scalar(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => Some(Self::Numeric(n)),
            serde_json::Value::String(s) => Some(Self::Text(s)),
            serde_json::Value::Bool(_) | serde_json::Value::Null => Some(Self::Unsupported(value)),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Numeric(n) => serde_json::Value::Number(n.clone()),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Unsupported(v) => v.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "number",
            Self::Text(_) => "string",
            Self::Unsupported(serde_json::Value::Bool(_)) => "boolean",
            Self::Unsupported(serde_json::Value::Null) => "null",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

/// Normalized, schema-stable representation of one telemetry event.
///
/// Reserved fields are fixed at construction and only exposed through
/// accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    id: String,
    device_id: String,
    schema: String,
    create_time: i64,
    received_time: i64,
    properties: HashMap<String, String>,
    payload: HashMap<String, PayloadValue>,
}

impl CanonicalRecord {
    /// Builds a record; the id is `<device id>;<received epoch millis>`.
    pub fn new(
        device_id: String,
        schema: String,
        create_time: i64,
        received_time: i64,
        properties: HashMap<String, String>,
        payload: HashMap<String, PayloadValue>,
    ) -> Self {
        Self {
            id: format!("{};{}", device_id, received_time),
            device_id,
            schema,
            create_time,
            received_time,
            properties,
            payload,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Broker-asserted creation time, epoch millis.
    pub fn create_time(&self) -> i64 {
        self.create_time
    }

    /// Local receipt time, epoch millis.
    pub fn received_time(&self) -> i64 {
        self.received_time
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn payload(&self) -> &HashMap<String, PayloadValue> {
        &self.payload
    }

    pub fn payload_field(&self, field: &str) -> Option<&PayloadValue> {
        self.payload.get(field)
    }
}
