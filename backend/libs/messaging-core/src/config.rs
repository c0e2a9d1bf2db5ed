//! Configuration knobs enumerated in spec.md §6.
//!
//! These are plain structs with `Default` impls carrying the spec's
//! stated defaults; the embedding service constructs and overrides them.
//! No env/config-crate parsing happens inside library crates — loading
//! configuration is explicitly the embedding service's job (spec.md §1).

use std::time::Duration;

/// Timing and batch sizing for the outbox relay and sweeper (C6/C7).
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// How often the sweeper runs `sweep_once`. Default 1s (spec.md §6
    /// `outbox_sweep_interval`).
    pub sweep_interval: Duration,
    /// Rows claimed per `sweep_once` call. Default 2000 (spec.md §6
    /// `outbox_batch_size`).
    pub batch_size: i64,
    /// Age past which a `CLAIMED` row is considered abandoned and
    /// reclaimed by `recover_stuck`.
    ///
    /// spec.md §6 names this `outbox_claim_timeout` with a stated
    /// default of 1s, but §4.4 states `recover_stuck`'s default age as
    /// "1 minute" for the same knob — an unresolved conflict the spec
    /// itself flags in §9. This implementation follows the §4.4 minute-
    /// scale default (see DESIGN.md): a 1-second threshold would reclaim
    /// rows still being actively published by a normal-latency transport
    /// call.
    pub claim_timeout: Duration,
    /// Cap on the exponential publish-retry backoff. Default 5 minutes
    /// (spec.md §6 `max_backoff`).
    pub max_backoff: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            batch_size: 2000,
            claim_timeout: Duration::from_secs(60),
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Command lifecycle timing (C8/C9).
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// How long a `RUNNING` lease lasts. Default 5 minutes (spec.md §6
    /// `command_lease`).
    pub command_lease: Duration,
    /// Zero (the default) means fire-and-forget `accept`; a positive
    /// value enables the synchronous-wait path via
    /// `process_manager::sync_wait::PendingReplies` (spec.md §6
    /// `sync_wait`).
    pub sync_wait: Duration,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            command_lease: Duration::from_secs(300),
            sync_wait: Duration::ZERO,
        }
    }
}

/// Destination-name templates for commands and replies (spec.md §6
/// `queue_naming.*`).
#[derive(Debug, Clone)]
pub struct QueueNaming {
    pub command_prefix: String,
    pub queue_suffix: String,
    pub reply_queue: String,
}

impl Default for QueueNaming {
    fn default() -> Self {
        Self {
            command_prefix: "cmd.".to_string(),
            queue_suffix: String::new(),
            reply_queue: "replies.default".to_string(),
        }
    }
}

impl QueueNaming {
    /// The destination queue for command `name`, e.g. `cmd.ship-order`.
    pub fn command_queue(&self, name: &str) -> String {
        format!("{}{}{}", self.command_prefix, name, self.queue_suffix)
    }
}

/// Destination-name template for events (spec.md §6 `topic_naming.*`).
#[derive(Debug, Clone)]
pub struct TopicNaming {
    pub event_prefix: String,
}

impl Default for TopicNaming {
    fn default() -> Self {
        Self {
            event_prefix: "events.".to_string(),
        }
    }
}

impl TopicNaming {
    pub fn event_topic(&self, name: &str) -> String {
        format!("{}{}", self.event_prefix, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_defaults_match_spec() {
        let config = OutboxConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 2000);
        assert_eq!(config.max_backoff, Duration::from_secs(300));
    }

    #[test]
    fn command_lease_defaults_to_five_minutes() {
        assert_eq!(CommandConfig::default().command_lease, Duration::from_secs(300));
    }

    #[test]
    fn queue_naming_applies_prefix_and_suffix() {
        let naming = QueueNaming {
            command_prefix: "cmd.".to_string(),
            queue_suffix: ".v1".to_string(),
            reply_queue: "replies.default".to_string(),
        };
        assert_eq!(naming.command_queue("ship-order"), "cmd.ship-order.v1");
    }

    #[test]
    fn event_topic_applies_prefix() {
        let naming = TopicNaming::default();
        assert_eq!(naming.event_topic("order-shipped"), "events.order-shipped");
    }
}
