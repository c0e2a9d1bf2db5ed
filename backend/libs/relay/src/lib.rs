//! # Outbox relay (C6) and sweeper (C7)
//!
//! The relay claims outbox rows — one at a time via the fast path, in
//! batches via the sweeper — and dispatches each to the transport its
//! `category` names. Claim and finalization (`mark_published` /
//! `mark_failed` / `reschedule`) are deliberately separate calls: a
//! transport failure after a successful claim still finalizes the row
//! (as `FAILED`, rescheduled), it just never leaves a row claimed and
//! forgotten.
//!
//! Grounded on `transactional_outbox::OutboxProcessor` for the overall
//! `start`/`process_batch`/metrics shape, generalized from a single
//! Kafka publisher and an unpublished/published binary state to a
//! three-way category dispatch over the `NEW/CLAIMED/PUBLISHED/FAILED`
//! lifecycle.

pub mod backoff;
mod error;
pub mod metrics;

pub use error::{RelayError, RelayResult};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use messaging_core::{OutboxConfig, OutboxRow};
use notifier::PublishNow;
use outbox::OutboxRepository;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Transport for `command` and `reply` category rows.
#[async_trait]
pub trait MqPublisher: Send + Sync {
    async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        r#type: &str,
        payload: &str,
        headers: &serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// Transport for `event` category rows.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        r#type: &str,
        payload: &str,
        headers: &serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// A transport that accepts everything and does nothing, for tests and
/// for wiring a relay before its real transports are configured.
pub struct NullPublisher;

#[async_trait]
impl MqPublisher for NullPublisher {
    async fn send(
        &self,
        _topic: &str,
        _key: Option<&str>,
        _type: &str,
        _payload: &str,
        _headers: &serde_json::Value,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(
        &self,
        _topic: &str,
        _key: Option<&str>,
        _type: &str,
        _payload: &str,
        _headers: &serde_json::Value,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Which entry point is finalizing a dispatched row, since spec.md
/// §4.4 specifies a different finalization call for each on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinalizeMode {
    FastPath,
    Sweep,
}

pub struct RelayConfig {
    pub claimer: String,
    pub batch_size: i64,
    pub max_backoff_ms: i64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&OutboxConfig::default())
    }
}

impl From<&OutboxConfig> for RelayConfig {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            claimer: format!("relay-{}", std::process::id()),
            batch_size: config.batch_size,
            max_backoff_ms: config.max_backoff.as_millis() as i64,
        }
    }
}

pub struct OutboxRelay<R: OutboxRepository> {
    repository: Arc<R>,
    mq: Arc<dyn MqPublisher>,
    events: Arc<dyn EventPublisher>,
    config: RelayConfig,
    metrics: Option<metrics::RelayMetrics>,
}

impl<R: OutboxRepository> OutboxRelay<R> {
    pub fn new(
        repository: Arc<R>,
        mq: Arc<dyn MqPublisher>,
        events: Arc<dyn EventPublisher>,
        config: RelayConfig,
    ) -> Self {
        Self {
            repository,
            mq,
            events,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: metrics::RelayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Dispatch a single already-claimed row to the transport its
    /// category names, per spec.md §4.4's dispatch table. Unrecognized
    /// categories dispatch nowhere and are treated as an error.
    async fn dispatch(&self, row: &OutboxRow) -> anyhow::Result<()> {
        match row.category() {
            Some(messaging_core::OutboxCategory::Command)
            | Some(messaging_core::OutboxCategory::Reply) => {
                self.mq
                    .send(
                        &row.topic,
                        row.key.as_deref(),
                        &row.r#type,
                        &row.payload,
                        &row.headers,
                    )
                    .await
            }
            Some(messaging_core::OutboxCategory::Event) => {
                self.events
                    .publish(
                        &row.topic,
                        row.key.as_deref(),
                        &row.r#type,
                        &row.payload,
                        &row.headers,
                    )
                    .await
            }
            None => Err(anyhow::anyhow!("Unknown category: {}", row.category_raw)),
        }
    }

    /// Claim `id` if still `NEW`, dispatch, and finalize. A claim miss
    /// (already taken by another replica, or already published) is a
    /// silent no-op.
    pub async fn publish_now(&self, id: i64) {
        let claimed = match self.repository.claim_if_new(id, &self.config.claimer).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(outbox_id = id, "publish_now: nothing to claim");
                return;
            }
            Err(e) => {
                error!(outbox_id = id, error = %e, "publish_now: claim failed");
                return;
            }
        };

        self.finalize_one(claimed, FinalizeMode::FastPath).await;
    }

    /// Claim up to `batch_size` eligible rows and publish each. Per-row
    /// failures are finalized independently and never abort the sweep.
    pub async fn sweep_once(&self) -> RelayResult<usize> {
        let rows = self
            .repository
            .sweep_batch(self.config.batch_size, &self.config.claimer)
            .await?;

        let n = rows.len();
        if n > 0 {
            debug!(claimed = n, "sweep_once: claimed batch");
        }

        for row in rows {
            self.finalize_one(row, FinalizeMode::Sweep).await;
        }

        Ok(n)
    }

    /// Finalize a claimed row after dispatch. On failure, the fast path
    /// (`publish_now`) calls `mark_failed` with an absolute `next_at`;
    /// the sweep path (`sweep_once`) calls `reschedule` with a relative
    /// `backoff_ms` — per spec.md §4.4, both make the row eligible for
    /// re-sweep once the same backoff law elapses.
    async fn finalize_one(&self, row: OutboxRow, mode: FinalizeMode) {
        let id = row.id;
        match self.dispatch(&row).await {
            Ok(()) => {
                if let Err(e) = self.repository.mark_published(id).await {
                    error!(outbox_id = id, error = %e, "mark_published failed after successful dispatch");
                } else if let Some(metrics) = &self.metrics {
                    metrics.published.inc();
                }
            }
            Err(e) => {
                warn!(outbox_id = id, error = %e, "dispatch failed");
                let backoff_ms = backoff::compute(row.attempts, self.config.max_backoff_ms);
                let result = match mode {
                    FinalizeMode::FastPath => {
                        let next_at = chrono::Utc::now() + chrono::Duration::milliseconds(backoff_ms);
                        self.repository.mark_failed(id, &e.to_string(), next_at).await
                    }
                    FinalizeMode::Sweep => {
                        self.repository.reschedule(id, backoff_ms, &e.to_string()).await
                    }
                };
                if let Err(mark_err) = result {
                    error!(outbox_id = id, error = %mark_err, "finalizing failed dispatch also failed");
                }
            }
        }
    }
}

#[async_trait]
impl<R: OutboxRepository> PublishNow for OutboxRelay<R> {
    async fn publish_now(&self, outbox_id: i64) {
        OutboxRelay::publish_now(self, outbox_id).await
    }
}

/// Drives `sweep_once` on a fixed interval and `recover_stuck` on a
/// secondary interval, generalizing `OutboxProcessor::start`'s
/// poll-then-sleep loop to two independent schedules.
pub struct OutboxSweeper<R: OutboxRepository> {
    relay: Arc<OutboxRelay<R>>,
    repository: Arc<R>,
    sweep_interval: Duration,
    recover_interval: Duration,
    max_claim_age: chrono::Duration,
    cancel: CancellationToken,
}

impl<R: OutboxRepository + 'static> OutboxSweeper<R> {
    pub fn new(relay: Arc<OutboxRelay<R>>, repository: Arc<R>) -> Self {
        Self::with_config(relay, repository, &OutboxConfig::default())
    }

    /// Builds a sweeper whose sweep interval and stuck-claim age come
    /// from `config` (spec.md §6 `outbox_sweep_interval` /
    /// `outbox_claim_timeout`). The recovery check runs on the same
    /// cadence as the claim-age threshold itself, since there is no
    /// separate spec-named knob for it.
    pub fn with_config(relay: Arc<OutboxRelay<R>>, repository: Arc<R>, config: &OutboxConfig) -> Self {
        Self {
            relay,
            repository,
            sweep_interval: config.sweep_interval,
            recover_interval: config.claim_timeout,
            max_claim_age: outbox::std_duration_to_chrono(config.claim_timeout),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_recover_interval(mut self, interval: Duration) -> Self {
        self.recover_interval = interval;
        self
    }

    pub async fn start(&self) {
        info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            recover_interval_secs = self.recover_interval.as_secs(),
            "outbox sweeper starting"
        );

        let mut sweep_tick = tokio::time::interval(self.sweep_interval);
        let mut recover_tick = tokio::time::interval(self.recover_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("outbox sweeper shutting down");
                    return;
                }
                _ = sweep_tick.tick() => {
                    if let Err(e) = self.relay.sweep_once().await {
                        error!(error = %e, "sweep_once failed");
                    }
                }
                _ = recover_tick.tick() => {
                    if let Err(e) = self.repository.recover_stuck(self.max_claim_age).await {
                        error!(error = %e, "recover_stuck failed");
                    }
                }
            }
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_publisher_accepts_everything() {
        let publisher = NullPublisher;
        let headers = serde_json::json!({});
        assert!(publisher
            .send("topic", Some("key"), "type", "{}", &headers)
            .await
            .is_ok());
        assert!(publisher
            .publish("topic", None, "type", "{}", &headers)
            .await
            .is_ok());
    }
}
