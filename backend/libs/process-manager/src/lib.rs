//! Event-sourced process manager (sagas): a pure-data step graph
//! executed by issuing commands through the command bus and reacting to
//! their replies, with retry/backoff and compensation cascades on
//! permanent failure.

pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod registry;
pub mod reply_consumer;
pub mod repository;
pub mod sync_wait;

pub use config::{ProcessConfigBuilder, ProcessConfiguration, RetryPredicate, StepConfig};
pub use error::{ProcessError, ProcessResult};
pub use manager::ProcessManager;
pub use metrics::ProcessMetrics;
pub use registry::{ProcessRegistry, RegistryError};
pub use reply_consumer::parse_reply_envelope;
pub use repository::{log_entry, PgProcessRepository, ProcessRepository};
pub use sync_wait::{PendingReplies, WaitOutcome};
