use common::domain::{Alarm, CanonicalRecord, Document};

pub const RECORD_DOC_SCHEMA: &str = "d2cmessage";
pub const ALARM_DOC_SCHEMA: &str = "alarm";
pub const DOC_SCHEMA_VERSION: i64 = 1;
pub const ALARM_LOGIC: &str = "1Rule-1Device-1Message";

const PROPERTY_PREFIX: &str = "metadata.";
const PAYLOAD_PREFIX: &str = "data.";

/// Flat record document; properties and payload live under their own prefixes
/// so they cannot collide with reserved keys.
pub fn record_document(record: &CanonicalRecord) -> Document {
    let mut doc = Document::new(record.id());
    doc.set("doc.schema", RECORD_DOC_SCHEMA);
    doc.set("doc.schemaVersion", DOC_SCHEMA_VERSION);
    doc.set("device.id", record.device_id());
    doc.set("device.msg.schema", record.schema());
    doc.set("device.msg.created", record.create_time());
    doc.set("device.msg.received", record.received_time());

    for (key, value) in record.properties() {
        doc.set(format!("{PROPERTY_PREFIX}{key}"), value.as_str());
    }
    for (key, value) in record.payload() {
        doc.set(format!("{PAYLOAD_PREFIX}{key}"), value.to_json());
    }

    doc
}

pub fn alarm_document(alarm: &Alarm) -> Document {
    let mut doc = Document::new(alarm.id.as_str());
    doc.set("doc.schema", ALARM_DOC_SCHEMA);
    doc.set("doc.schemaVersion", DOC_SCHEMA_VERSION);
    doc.set("created", alarm.created_at.timestamp_millis());
    doc.set("modified", alarm.modified_at.timestamp_millis());
    doc.set("status", alarm.status.as_str());
    doc.set("description", alarm.description.as_str());
    doc.set("rule.id", alarm.rule_id.as_str());
    doc.set("rule.severity", alarm.rule_severity.as_str());
    doc.set("rule.description", alarm.rule_description.as_str());
    doc.set("logic", ALARM_LOGIC);
    doc.set("device.id", alarm.device_id.as_str());
    doc.set("device.msg.received", alarm.message_received_time);
    doc
}
