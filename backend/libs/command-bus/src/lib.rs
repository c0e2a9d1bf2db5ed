//! # Command bus + transactional executor (C8/C9)
//!
//! `CommandBus::accept` is the write side: idempotency-checked command
//! acceptance plus an outbox row, all in one transaction, with fast-path
//! notification registered only after that transaction commits.
//! `TransactionalExecutor::process` is the read/dispatch side: inbox
//! dedupe, handler invocation, and reply/event outbox writes, also in
//! one transaction.
//!
//! Grounded on `idempotent_consumer`'s repository idiom for the
//! persistence layer and the platform's outbox/inbox crates for the
//! transactional plumbing; the registry and executor shapes are new,
//! built in the same style.

mod bus;
mod error;
mod executor;
mod registry;
mod repository;

pub use bus::{queue_for, CommandBus};
pub use error::{CommandBusError, CommandBusResult, HandlerError};
pub use executor::TransactionalExecutor;
pub use registry::{CommandEnvelope, CommandHandler, HandlerRegistry, HandlerRegistryBuilder, RegistryError};
pub use repository::{CommandRepository, PgCommandRepository};
