//! Row and wire types shared by every crate in the messaging core.
//!
//! These mirror the tables described in the platform's data model: the
//! outbox, the inbox, the command lifecycle, the dead-letter queue, and
//! the process-manager's instance/log tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Destination kind for an outbox row. Wire/column form is lowercase and
/// matched case-sensitively — `COMMAND` is not the same as `command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxCategory {
    Command,
    Reply,
    Event,
}

impl fmt::Display for OutboxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutboxCategory::Command => "command",
            OutboxCategory::Reply => "reply",
            OutboxCategory::Event => "event",
        };
        f.write_str(s)
    }
}

impl FromStr for OutboxCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command" => Ok(OutboxCategory::Command),
            "reply" => Ok(OutboxCategory::Reply),
            "event" => Ok(OutboxCategory::Event),
            _ => Err(()),
        }
    }
}

/// Lifecycle of a single outbox row.
///
/// `NEW -> CLAIMED -> PUBLISHED` on the happy path, or `-> FAILED` on
/// error. `FAILED` is not terminal: a row whose `next_at` has elapsed is
/// still claimable by the sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    New,
    Claimed,
    Published,
    Failed,
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutboxStatus::New => "NEW",
            OutboxStatus::Claimed => "CLAIMED",
            OutboxStatus::Published => "PUBLISHED",
            OutboxStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl FromStr for OutboxStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OutboxStatus::New),
            "CLAIMED" => Ok(OutboxStatus::Claimed),
            "PUBLISHED" => Ok(OutboxStatus::Published),
            "FAILED" => Ok(OutboxStatus::Failed),
            _ => Err(()),
        }
    }
}

/// A row in the `outbox` table.
///
/// `category_raw` retains the exact string read back from the column so
/// an unrecognized value can still be reported by the dispatcher instead
/// of being silently coerced to a known variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRow {
    pub id: i64,
    pub category_raw: String,
    pub topic: String,
    pub key: Option<String>,
    pub r#type: String,
    pub payload: String,
    pub headers: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl OutboxRow {
    /// Typed category, if the stored value is one of the known variants.
    pub fn category(&self) -> Option<OutboxCategory> {
        self.category_raw.parse().ok()
    }
}

/// A row in the `inbox` table: proof that `consumer` has already
/// accepted `message_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxRow {
    pub message_id: String,
    pub consumer: String,
    pub received_at: DateTime<Utc>,
}

/// Lifecycle of a command accepted by the command bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::Pending => "PENDING",
            CommandStatus::Running => "RUNNING",
            CommandStatus::Succeeded => "SUCCEEDED",
            CommandStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl FromStr for CommandStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(CommandStatus::Pending),
            "RUNNING" => Ok(CommandStatus::Running),
            "SUCCEEDED" => Ok(CommandStatus::Succeeded),
            "FAILED" => Ok(CommandStatus::Failed),
            _ => Err(()),
        }
    }
}

/// A row in the `command` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRow {
    pub command_id: Uuid,
    pub name: String,
    pub idempotency_key: String,
    pub business_key: String,
    pub payload: String,
    pub reply_spec: serde_json::Value,
    pub status: CommandStatus,
    pub retries: i32,
    pub last_error: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A row in the `dlq` table: a permanently failed command parked for
/// manual inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRow {
    pub id: Uuid,
    pub command_id: Uuid,
    pub name: String,
    pub business_key: String,
    pub payload: String,
    pub failed_status: String,
    pub error_class: String,
    pub error_message: String,
    pub attempts: i32,
    pub parked_by: String,
    pub parked_at: DateTime<Utc>,
}

/// Status of the reply produced by a command handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyStatus {
    Completed,
    Failed,
    TimedOut,
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplyStatus::Completed => "COMPLETED",
            ReplyStatus::Failed => "FAILED",
            ReplyStatus::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}

/// The result a command handler hands back to the executor, and that a
/// process reply eventually carries back to the process manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReply {
    pub command_id: Uuid,
    pub correlation_id: Option<Uuid>,
    pub status: ReplyStatus,
    pub data: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
}

impl CommandReply {
    pub fn completed(command_id: Uuid, data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            command_id,
            correlation_id: None,
            status: ReplyStatus::Completed,
            data,
            error: None,
        }
    }

    pub fn failed(command_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            command_id,
            correlation_id: None,
            status: ReplyStatus::Failed,
            data: HashMap::new(),
            error: Some(error.into()),
        }
    }
}

/// Lifecycle of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    New,
    Running,
    Succeeded,
    Failed,
    Compensating,
    Compensated,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::New => "NEW",
            ProcessStatus::Running => "RUNNING",
            ProcessStatus::Succeeded => "SUCCEEDED",
            ProcessStatus::Failed => "FAILED",
            ProcessStatus::Compensating => "COMPENSATING",
            ProcessStatus::Compensated => "COMPENSATED",
        };
        f.write_str(s)
    }
}

impl FromStr for ProcessStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(ProcessStatus::New),
            "RUNNING" => Ok(ProcessStatus::Running),
            "SUCCEEDED" => Ok(ProcessStatus::Succeeded),
            "FAILED" => Ok(ProcessStatus::Failed),
            "COMPENSATING" => Ok(ProcessStatus::Compensating),
            "COMPENSATED" => Ok(ProcessStatus::Compensated),
            _ => Err(()),
        }
    }
}

/// A row in the `process_instance` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub process_id: Uuid,
    pub process_type: String,
    pub business_key: String,
    pub status: ProcessStatus,
    pub current_step: Option<String>,
    pub data: HashMap<String, serde_json::Value>,
    pub retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tagged event variants appended to a process's event log. The tag is
/// the `type` discriminator on the wire (serde's internally-tagged
/// representation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcessEvent {
    ProcessStarted,
    StepStarted { step: String },
    StepCompleted { step: String },
    StepFailed { step: String, retry: bool, error: String },
    ProcessCompleted,
    ProcessFailed { error: String },
    CompensationStarted,
    CompensationCompleted,
}

/// A single append-only entry in a process's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessLogEntry {
    pub process_id: Uuid,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub event: ProcessEvent,
}
