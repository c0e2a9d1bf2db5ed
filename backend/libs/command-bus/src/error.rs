//! Error types for the command bus and executor.

use thiserror::Error;

pub type CommandBusResult<T> = Result<T, CommandBusError>;

#[derive(Error, Debug)]
pub enum CommandBusError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),

    #[error("Inbox error: {0}")]
    Inbox(#[from] inbox::InboxError),

    #[error("DLQ error: {0}")]
    Dlq(#[from] dlq::DlqError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    #[error("No handler registered for command: {0}")]
    UnknownCommand(String),

    #[error("Command not found: {0}")]
    CommandNotFound(uuid::Uuid),

    #[error("Handler failed transiently: {0}")]
    HandlerTransient(String),

    #[error("Handler failed retryably: {0}")]
    HandlerRetryable(String),
}

/// The three ways a [`crate::CommandHandler`] can fail, mirroring
/// spec.md §6's `PermanentException` / `RetryableBusinessException` /
/// `TransientException` trio.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Will never succeed no matter how many times it's retried. Routed
    /// to the DLQ.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// A business-level condition that might clear up (e.g. a
    /// optimistic-lock conflict). Redelivered by the framework.
    #[error("retryable failure: {0}")]
    Retryable(String),

    /// An infrastructure hiccup (timeout, connection reset). Redelivered
    /// by the framework, same as `Retryable`, but counted separately in
    /// diagnostics.
    #[error("transient failure: {0}")]
    Transient(String),
}
