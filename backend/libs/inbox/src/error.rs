//! Error types for the inbox repository.

use thiserror::Error;

pub type InboxResult<T> = Result<T, InboxError>;

#[derive(Error, Debug)]
pub enum InboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid message id: {0}")]
    InvalidMessageId(String),
}
