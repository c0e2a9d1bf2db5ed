//! Error types for the dead-letter service.

use thiserror::Error;

pub type DlqResult<T> = Result<T, DlqError>;

#[derive(Error, Debug)]
pub enum DlqError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
