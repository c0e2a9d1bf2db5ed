//! Error types for the fast-path notifier.

use thiserror::Error;

pub type NotifierResult<T> = Result<T, NotifierError>;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Notifier dispatch failed: {0}")]
    Dispatch(String),
}
