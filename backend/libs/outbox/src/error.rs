//! Error types for the outbox repository.

use thiserror::Error;

pub type OutboxResult<T> = Result<T, OutboxError>;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Outbox row not found: {0}")]
    RowNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Outbox error: {0}")]
    Other(#[from] anyhow::Error),
}
