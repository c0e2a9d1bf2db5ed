//! Error types for the process manager.

use thiserror::Error;

pub type ProcessResult<T> = Result<T, ProcessError>;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Command bus error: {0}")]
    CommandBus(#[from] command_bus::CommandBusError),

    #[error(transparent)]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Process instance not found: {0}")]
    InstanceNotFound(uuid::Uuid),
}
