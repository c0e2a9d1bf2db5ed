//! Process reply consumer (C11): parses an inbound reply envelope and
//! routes it to [`crate::ProcessManager::handle_reply`]. Every
//! malformed-input case (bad JSON, missing/invalid UUIDs, missing or
//! unknown `type`, a `null` body) is swallowed with a `tracing::warn!`
//! — no exception escapes this boundary and the process manager is
//! never invoked with garbage.

use std::collections::HashMap;

use messaging_core::{CommandReply, ReplyStatus};
use tracing::warn;
use uuid::Uuid;

/// Parse a reply envelope of the shape
/// `{ commandId, correlationId, type, payload?, error? }` into a
/// `(process_id, CommandReply)` pair, or `None` if anything about it is
/// malformed. Never panics.
pub fn parse_reply_envelope(body: &serde_json::Value) -> Option<(Uuid, CommandReply)> {
    let obj = body.as_object()?;

    let command_id = obj
        .get("commandId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    let command_id = match command_id {
        Some(id) => id,
        None => {
            warn!("reply envelope missing or invalid commandId");
            return None;
        }
    };

    let process_id = obj
        .get("correlationId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    let process_id = match process_id {
        Some(id) => id,
        None => {
            warn!(%command_id, "reply envelope missing or invalid correlationId");
            return None;
        }
    };

    let type_str = obj.get("type").and_then(|v| v.as_str());
    let status = match type_str {
        Some("CommandCompleted") => ReplyStatus::Completed,
        Some("CommandFailed") => ReplyStatus::Failed,
        Some("CommandTimedOut") => ReplyStatus::TimedOut,
        Some(other) => {
            warn!(%command_id, %process_id, type = other, "reply envelope has unknown type");
            return None;
        }
        None => {
            warn!(%command_id, %process_id, "reply envelope missing type");
            return None;
        }
    };

    let data: HashMap<String, serde_json::Value> = match status {
        ReplyStatus::Completed => match obj.get("payload") {
            Some(serde_json::Value::Object(map)) => map.clone().into_iter().collect(),
            Some(serde_json::Value::Null) | None => HashMap::new(),
            Some(_) => {
                warn!(%command_id, %process_id, "reply envelope payload is not an object");
                return None;
            }
        },
        ReplyStatus::Failed | ReplyStatus::TimedOut => HashMap::new(),
    };

    let error = match status {
        ReplyStatus::Completed => None,
        _ => obj
            .get("error")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
    };

    Some((
        process_id,
        CommandReply {
            command_id,
            correlation_id: Some(process_id),
            status,
            data,
            error,
        },
    ))
}
