//! Shared data model and store adapter for the messaging core.
//!
//! Every other crate in this workspace (`outbox`, `inbox`, `relay`,
//! `notifier`, `dlq`, `command-bus`, `process-manager`) builds on the row
//! types and the transactional scope defined here, instead of each
//! crate talking to `sqlx::PgPool` in its own idiom.

pub mod config;
pub mod model;
pub mod store;

pub use config::{CommandConfig, OutboxConfig, QueueNaming, TopicNaming};
pub use model::{
    CommandReply, CommandRow, CommandStatus, DlqRow, InboxRow, OutboxCategory, OutboxRow,
    OutboxStatus, ProcessEvent, ProcessInstance, ProcessLogEntry, ProcessStatus, ReplyStatus,
};
pub use store::{swallow_hook_error, Store, TxScope};
