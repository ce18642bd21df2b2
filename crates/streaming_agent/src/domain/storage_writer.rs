use common::domain::{DeadLetterProducer, Document, DocumentStore, DomainError, DomainResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// What happens to a document the store rejected with a non-conflict error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageFailurePolicy {
    /// Log and move on.
    Drop,
    /// Retry with linear backoff (`backoff * attempt`), then drop.
    Retry { attempts: u32, backoff: Duration },
    /// Hand the document to the dead-letter producer.
    DeadLetter,
}

impl StorageFailurePolicy {
    pub fn from_config(name: &str, attempts: u32, backoff: Duration) -> DomainResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "retry" => Ok(Self::Retry { attempts, backoff }),
            "dead_letter" | "deadletter" => Ok(Self::DeadLetter),
            other => Err(DomainError::InvalidConfiguration(format!(
                "unknown storage failure policy: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored,
    DeadLettered,
    Dropped,
}

/// Writes one kind of document (`messages`, `alarms`) and applies the
/// failure policy. Never returns an error to the pipeline.
pub struct StorageWriter {
    kind: String,
    store: Arc<dyn DocumentStore>,
    policy: StorageFailurePolicy,
    dead_letter: Option<Arc<dyn DeadLetterProducer>>,
}

impl StorageWriter {
    pub fn new(
        kind: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        policy: StorageFailurePolicy,
        dead_letter: Option<Arc<dyn DeadLetterProducer>>,
    ) -> DomainResult<Self> {
        if policy == StorageFailurePolicy::DeadLetter && dead_letter.is_none() {
            return Err(DomainError::InvalidConfiguration(
                "dead_letter policy requires a dead letter producer".to_string(),
            ));
        }

        Ok(Self {
            kind: kind.into(),
            store,
            policy,
            dead_letter,
        })
    }

    pub async fn open(&self) -> DomainResult<()> {
        self.store.open().await
    }

    #[instrument(skip(self, document), fields(kind = %self.kind, document_id = %document.id))]
    pub async fn write(&self, document: &Document) -> WriteOutcome {
        let err = match self.store.write(document).await {
            Ok(()) => return WriteOutcome::Stored,
            Err(e) => e,
        };

        match &self.policy {
            StorageFailurePolicy::Drop => {
                error!(error = %err, "storage write failed, document dropped");
                WriteOutcome::Dropped
            }
            StorageFailurePolicy::Retry { attempts, backoff } => {
                warn!(error = %err, "storage write failed, retrying");
                for attempt in 1..=*attempts {
                    tokio::time::sleep(*backoff * attempt).await;
                    match self.store.write(document).await {
                        Ok(()) => {
                            debug!(attempt, "storage write succeeded after retry");
                            return WriteOutcome::Stored;
                        }
                        Err(e) => warn!(attempt, error = %e, "storage write retry failed"),
                    }
                }
                error!(attempts = *attempts, "storage write retries exhausted, document dropped");
                WriteOutcome::Dropped
            }
            StorageFailurePolicy::DeadLetter => {
                let Some(producer) = &self.dead_letter else {
                    error!(error = %err, "storage write failed and no dead letter producer, document dropped");
                    return WriteOutcome::Dropped;
                };
                match producer.publish(&self.kind, document).await {
                    Ok(()) => {
                        warn!(error = %err, "storage write failed, document dead-lettered");
                        WriteOutcome::DeadLettered
                    }
                    Err(e) => {
                        error!(error = %err, dead_letter_error = %e, "dead letter publish failed, document dropped");
                        WriteOutcome::Dropped
                    }
                }
            }
        }
    }
}
