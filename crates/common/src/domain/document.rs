use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Flat key/value document written to a storage sink.
///
/// `id` decides conflict behaviour at the storage layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Full JSON body, `id` included.
    pub fn to_json(&self) -> Value {
        let mut body = self.fields.clone();
        body.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(body)
    }
}

/// Repository trait for document persistence
/// Infrastructure layer (e.g., PostgreSQL) implements this trait
///
/// Implementations should:
/// - Make `open` idempotent and tolerate a concurrent creator
/// - Treat an id conflict on `write` as success (already persisted)
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the backing database and collection if absent
    async fn open(&self) -> DomainResult<()>;

    /// Write a single document
    async fn write(&self, document: &Document) -> DomainResult<()>;
}

/// Publishes documents that could not be stored
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeadLetterProducer: Send + Sync {
    /// # Arguments
    /// * `kind` - Document kind (`messages`, `alarms`)
    /// * `document` - The document the store rejected
    async fn publish(&self, kind: &str, document: &Document) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_json_includes_id() {
        let mut doc = Document::new("doc-1");
        doc.set("device.id", "device-1");
        doc.set("doc.schemaVersion", 1);

        assert_eq!(
            doc.to_json(),
            json!({"id": "doc-1", "device.id": "device-1", "doc.schemaVersion": 1})
        );
    }
}
