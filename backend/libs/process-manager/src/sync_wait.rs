//! Synchronous command-wait registry (spec.md §5/§9): a caller that
//! wants to block on a command's reply instead of firing-and-forgetting
//! registers a one-shot channel here keyed by `command_id`, with a
//! 2-second auto-timeout and eviction on every exit path so the map
//! never accumulates orphaned entries.
//!
//! Grounded on the teacher's use of `dashmap` for lock-free shared maps
//! (same dependency, reused here instead of a hand-rolled `Mutex<HashMap>`).

use std::time::Duration;

use dashmap::DashMap;
use messaging_core::CommandReply;
use tokio::sync::oneshot;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    TimedOut,
}

#[derive(Default)]
pub struct PendingReplies {
    waiters: DashMap<Uuid, oneshot::Sender<CommandReply>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait for `command_id` and block (asynchronously) on
    /// the result, evicting the entry on every exit path: delivery,
    /// timeout, or the sender being dropped.
    pub async fn wait_for(&self, command_id: Uuid) -> Result<CommandReply, WaitOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(command_id, tx);

        let result = tokio::time::timeout(DEFAULT_TIMEOUT, rx).await;
        self.waiters.remove(&command_id);

        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) | Err(_) => Err(WaitOutcome::TimedOut),
        }
    }

    /// Deliver a reply to whoever is waiting on `command_id`, if anyone
    /// is. A missing waiter (nobody registered, or it already timed
    /// out) is not an error.
    pub fn deliver(&self, command_id: Uuid, reply: CommandReply) {
        if let Some((_, sender)) = self.waiters.remove(&command_id) {
            let _ = sender.send(reply);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_core::ReplyStatus;
    use std::collections::HashMap;

    #[tokio::test]
    async fn nobody_delivers_and_the_wait_times_out() {
        let pending = std::sync::Arc::new(PendingReplies::new());
        let command_id = Uuid::new_v4();

        let waiter_pending = pending.clone();
        let waiter = tokio::spawn(async move { waiter_pending.wait_for(command_id).await });

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(WaitOutcome::TimedOut)));
        assert!(pending.waiters.is_empty());
    }

    #[tokio::test]
    async fn delivering_to_nobody_is_not_an_error() {
        let pending = PendingReplies::new();
        pending.deliver(
            Uuid::new_v4(),
            CommandReply::completed(Uuid::new_v4(), HashMap::new()),
        );
    }

    #[tokio::test]
    async fn deliver_before_timeout_resolves_successfully() {
        let pending = std::sync::Arc::new(PendingReplies::new());
        let command_id = Uuid::new_v4();

        let waiter_pending = pending.clone();
        let waiter = tokio::spawn(async move { waiter_pending.wait_for(command_id).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        pending.deliver(
            command_id,
            CommandReply {
                command_id,
                correlation_id: None,
                status: ReplyStatus::Completed,
                data: HashMap::new(),
                error: None,
            },
        );

        let result = waiter.await.unwrap();
        assert!(result.is_ok());
    }
}
