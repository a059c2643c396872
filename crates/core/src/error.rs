use thiserror::Error;
use uuid::Uuid;

pub type NocturneResult<T> = Result<T, NocturneError>;

#[derive(Error, Debug)]
pub enum NocturneError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache store error: {0}")]
    Cache(String),

    #[error("Durable store error: {0}")]
    Store(String),

    #[error("Sleep record not found: {0}")]
    RecordNotFound(Uuid),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
