use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Remote dependency failure: {0}")]
    RemoteDependency(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Dead letter publish failed: {0}")]
    DeadLetterError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}
