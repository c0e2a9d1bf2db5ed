//! # Fast-path notifier (C5)
//!
//! A Redis list (`outbox:notify`) carries freshly-inserted outbox ids
//! from producer to relay faster than the sweeper's poll interval would.
//! It is advisory only: a lost or duplicated notification is corrected
//! by the sweeper, so every failure mode here is "log and move on."
//!
//! Grounded on `cache_invalidation::InvalidationPublisher` /
//! `InvalidationSubscriber`: a `ConnectionManager`-backed publisher and
//! a long-lived subscriber task whose shutdown is driven by a handle the
//! caller holds, generalized from pub/sub channel invalidation to a
//! work-queue (`BLPOP`) consumer with bounded concurrency and cooperative
//! cancellation instead of the teacher's `JoinHandle::abort`.

mod error;

pub use error::{NotifierError, NotifierResult};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const NOTIFY_KEY: &str = "outbox:notify";
const DEFAULT_PERMITS: usize = 16;
const BLPOP_TIMEOUT_SECS: f64 = 5.0;

/// Implemented by whatever owns the claim/publish path (the relay), so
/// this crate never has to depend on it directly.
#[async_trait]
pub trait PublishNow: Send + Sync {
    async fn publish_now(&self, outbox_id: i64);
}

/// Producer side: registers an outbox id for fast-path pickup.
///
/// `register` is synchronous by design — its only caller is
/// [`messaging_core::TxScope::after_commit`], whose hooks are plain
/// `FnOnce()`. The enqueue itself happens on a spawned task so the hook
/// returns immediately; any failure is logged and swallowed, never
/// propagated back to the transaction that already committed.
#[derive(Clone)]
pub struct OutboxNotifier {
    manager: ConnectionManager,
}

impl OutboxNotifier {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub fn register(&self, outbox_id: i64) {
        let mut manager = self.manager.clone();
        tokio::spawn(async move {
            let result: redis::RedisResult<()> = manager.lpush(NOTIFY_KEY, outbox_id).await;
            if let Err(e) = result {
                warn!(outbox_id, error = %e, "fast-path notify enqueue failed; sweeper will recover");
            } else {
                debug!(outbox_id, "fast-path notify enqueued");
            }
        });
    }
}

/// Consumer side: blocks on `BLPOP` and dispatches each popped id to a
/// [`PublishNow`] implementation, bounded by a semaphore so a burst of
/// notifications can't open unbounded concurrent claims.
pub struct NotifyConsumer {
    client: redis::Client,
    publisher: Arc<dyn PublishNow>,
    permits: usize,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl NotifyConsumer {
    pub fn new(client: redis::Client, publisher: Arc<dyn PublishNow>) -> Self {
        Self {
            client,
            publisher,
            permits: DEFAULT_PERMITS,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_permits(mut self, permits: usize) -> Self {
        self.permits = permits.max(1);
        self
    }

    /// Runs until `close()` is called or cancellation is observed
    /// between `BLPOP` calls. In-flight dispatches are allowed to finish
    /// (cooperative cancellation, not `JoinHandle::abort`).
    pub async fn run(&self) -> NotifierResult<()> {
        let semaphore = Arc::new(Semaphore::new(self.permits));
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let popped: Option<(String, String)> = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                result = conn.blpop(NOTIFY_KEY, BLPOP_TIMEOUT_SECS) => result?,
            };

            let Some((_key, raw)) = popped else {
                continue;
            };

            let outbox_id = match raw.parse::<i64>() {
                Ok(id) if id > 0 => id,
                Ok(_) | Err(_) => {
                    warn!(value = %raw, "outbox:notify entry is not a positive integer; skipping");
                    continue;
                }
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Ok(()),
            };
            let publisher = Arc::clone(&self.publisher);

            tokio::spawn(async move {
                publisher.publish_now(outbox_id).await;
                drop(permit);
            });
        }
    }

    /// Signal the run loop to stop after its current `BLPOP` call.
    /// Calling this more than once is a no-op.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.cancel.cancel();
        } else {
            debug!("NotifyConsumer::close called more than once; ignoring");
        }
    }
}

pub fn default_timeout() -> Duration {
    Duration::from_secs_f64(BLPOP_TIMEOUT_SECS)
}
