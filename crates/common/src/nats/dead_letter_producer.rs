use crate::domain::{DeadLetterProducer, Document, DomainError, DomainResult};
use crate::nats::traits::JetStreamPublisher;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Publishes rejected documents to `<stream>.<kind>` on JetStream.
pub struct NatsDeadLetterProducer {
    publisher: Arc<dyn JetStreamPublisher>,
    base_subject: String,
}

impl NatsDeadLetterProducer {
    pub fn new(publisher: Arc<dyn JetStreamPublisher>, base_subject: String) -> Self {
        Self {
            publisher,
            base_subject,
        }
    }
}

#[async_trait]
impl DeadLetterProducer for NatsDeadLetterProducer {
    #[instrument(skip(self, document), fields(kind = %kind, document_id = %document.id))]
    async fn publish(&self, kind: &str, document: &Document) -> DomainResult<()> {
        let payload = serde_json::to_vec(&document.to_json())
            .map_err(|e| DomainError::DeadLetterError(e.to_string()))?;
        let subject = format!("{}.{}", self.base_subject, kind);

        self.publisher
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| DomainError::DeadLetterError(e.to_string()))?;

        debug!(subject = %subject, "Published document to dead letter stream");
        Ok(())
    }
}
