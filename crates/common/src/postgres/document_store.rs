use crate::domain::{Document, DocumentStore, DomainError, DomainResult};
use crate::postgres::{PostgresClient, StorageConfig};
use async_trait::async_trait;
use tracing::{debug, info, instrument};

// Errors a concurrent creator can cause during CREATE ... IF NOT EXISTS.
const DUPLICATE_SCHEMA: &str = "42P06";
const DUPLICATE_TABLE: &str = "42P07";
const UNIQUE_VIOLATION: &str = "23505";

/// Stores documents as JSONB rows keyed by document id.
///
/// `database` maps to a PostgreSQL schema and `collection` to a table in it.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    client: PostgresClient,
    schema: String,
    table: String,
}

impl PostgresDocumentStore {
    pub fn new(client: PostgresClient, database: &str, collection: &str) -> DomainResult<Self> {
        validate_identifier(database)?;
        validate_identifier(collection)?;

        Ok(Self {
            client,
            schema: database.to_string(),
            table: collection.to_string(),
        })
    }

    pub fn from_config(config: &StorageConfig) -> DomainResult<Self> {
        let client =
            PostgresClient::from_connection_string(&config.connection_string, config.max_pool_size)?;
        Self::new(client, &config.database, &config.collection)
    }

    fn qualified_table(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self), fields(schema = %self.schema, table = %self.table))]
    async fn open(&self) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let statements = [
            format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.schema),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    document JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )",
                self.qualified_table()
            ),
        ];

        for statement in &statements {
            if let Err(e) = conn.batch_execute(statement).await {
                let code = e.as_db_error().map(|db_err| db_err.code().code());
                match code {
                    Some(DUPLICATE_SCHEMA) | Some(DUPLICATE_TABLE) | Some(UNIQUE_VIOLATION) => {
                        debug!(code = ?code, "storage object created concurrently");
                    }
                    _ => return Err(DomainError::RepositoryError(e.into())),
                }
            }
        }

        info!("document store ready");
        Ok(())
    }

    #[instrument(skip(self, document), fields(table = %self.table, document_id = %document.id))]
    async fn write(&self, document: &Document) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let body = document.to_json();
        let result = conn
            .execute(
                &format!(
                    "INSERT INTO {} (id, document) VALUES ($1, $2)",
                    self.qualified_table()
                ),
                &[&document.id, &body],
            )
            .await;

        if let Err(e) = result {
            if let Some(db_err) = e.as_db_error() {
                if db_err.code().code() == UNIQUE_VIOLATION {
                    debug!("document already persisted");
                    return Ok(());
                }
            }
            return Err(DomainError::RepositoryError(e.into()));
        }

        debug!("document written");
        Ok(())
    }
}

fn validate_identifier(name: &str) -> DomainResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidConfiguration(format!(
            "invalid storage identifier: {:?}",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("telemetry").is_ok());
        assert!(validate_identifier("_alarms_2024").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("messages; DROP TABLE x").is_err());
        assert!(validate_identifier("my-table").is_err());
    }

    #[test]
    fn test_new_rejects_bad_collection_name() {
        let client = PostgresClient::new("localhost", 5432, "postgres", "u", "p", 1).unwrap();

        let result = PostgresDocumentStore::new(client, "telemetry", "bad name");

        assert!(matches!(result, Err(DomainError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_qualified_table_is_quoted() {
        let client = PostgresClient::new("localhost", 5432, "postgres", "u", "p", 1).unwrap();

        let store = PostgresDocumentStore::new(client, "telemetry", "alarms").unwrap();

        assert_eq!(store.qualified_table(), "\"telemetry\".\"alarms\"");
    }
}
