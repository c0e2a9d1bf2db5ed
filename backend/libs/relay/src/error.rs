//! Error types for the outbox relay and sweeper.

use thiserror::Error;

pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),

    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}
