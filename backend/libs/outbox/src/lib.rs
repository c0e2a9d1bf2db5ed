//! # Outbox repository (C2)
//!
//! Persists outgoing commands, replies, and events in the same
//! transaction as the business state that produced them, then exposes
//! the claim/publish/reschedule lifecycle the relay and sweeper drive.
//!
//! Grounded on `transactional-outbox::SqlxOutboxRepository` from the
//! platform's Kafka-oriented outbox, generalized from a single
//! `aggregate_type`/`event_type` shape to the three-category
//! (`command`/`reply`/`event`) row the messaging core needs, and from a
//! plain `published_at IS NULL` poll to an explicit `NEW/CLAIMED/
//! PUBLISHED/FAILED` state machine with row-level claim locking.

mod error;

pub use error::{OutboxError, OutboxResult};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use messaging_core::{OutboxCategory, OutboxRow, OutboxStatus, TxScope};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

/// Repository trait for the outbox table (C2 in the component design).
///
/// `insert_returning_id` must be called through an active [`TxScope`] so
/// it participates in the caller's business transaction; every other
/// operation runs against the pool directly, since each is already
/// atomic as a single statement.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn insert_returning_id(
        &self,
        tx: &mut TxScope<'_>,
        category: &str,
        topic: &str,
        key: Option<&str>,
        r#type: &str,
        payload: &str,
        headers: Option<serde_json::Value>,
    ) -> OutboxResult<i64>;

    /// Claim row `id` iff it is still `NEW` and due. At most one caller
    /// ever observes `Some` for a given id, even under concurrent calls.
    async fn claim_if_new(&self, id: i64, claimer: &str) -> OutboxResult<Option<OutboxRow>>;

    /// Claim up to `limit` eligible rows in insertion order. A row is
    /// eligible if it is `NEW` and due, or `FAILED` with a due `next_at`
    /// (the sweeper treats a failed-but-due row as re-sweepable).
    async fn sweep_batch(&self, limit: i64, claimer: &str) -> OutboxResult<Vec<OutboxRow>>;

    async fn mark_published(&self, id: i64) -> OutboxResult<()>;

    async fn mark_failed(&self, id: i64, error: &str, next_at: DateTime<Utc>) -> OutboxResult<()>;

    async fn reschedule(&self, id: i64, backoff_ms: i64, error: &str) -> OutboxResult<()>;

    /// Reclaim rows whose claimer crashed: any `CLAIMED` row older than
    /// `max_claim_age` is reset to `NEW` with `claimed_by` cleared.
    async fn recover_stuck(&self, max_claim_age: chrono::Duration) -> OutboxResult<u64>;
}

pub struct PgOutboxRepository {
    pool: PgPool,
}

impl PgOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_outbox(row: &sqlx::postgres::PgRow) -> Result<OutboxRow, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status = status_raw.parse().unwrap_or(OutboxStatus::New);
    Ok(OutboxRow {
        id: row.try_get("id")?,
        category_raw: row.try_get("category")?,
        topic: row.try_get("topic")?,
        key: row.try_get("key")?,
        r#type: row.try_get("type")?,
        payload: row.try_get("payload")?,
        headers: row.try_get("headers")?,
        status,
        attempts: row.try_get("attempts")?,
        next_at: row.try_get("next_at")?,
        claimed_by: row.try_get("claimed_by")?,
        claimed_at: row.try_get("claimed_at")?,
        created_at: row.try_get("created_at")?,
        published_at: row.try_get("published_at")?,
        last_error: row.try_get("last_error")?,
    })
}

#[async_trait]
impl OutboxRepository for PgOutboxRepository {
    async fn insert_returning_id(
        &self,
        tx: &mut TxScope<'_>,
        category: &str,
        topic: &str,
        key: Option<&str>,
        r#type: &str,
        payload: &str,
        headers: Option<serde_json::Value>,
    ) -> OutboxResult<i64> {
        let headers = headers.unwrap_or_else(|| serde_json::json!({}));

        let row = sqlx::query(
            r#"
            INSERT INTO outbox (category, topic, key, type, payload, headers, status, attempts, next_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'NEW', 0, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(category)
        .bind(topic)
        .bind(key)
        .bind(r#type)
        .bind(payload)
        .bind(&headers)
        .fetch_one(&mut *tx.tx)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!(outbox_id = id, category, topic, "outbox row inserted");
        Ok(id)
    }

    async fn claim_if_new(&self, id: i64, claimer: &str) -> OutboxResult<Option<OutboxRow>> {
        let row = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'CLAIMED', claimed_by = $2, claimed_at = NOW()
            WHERE id = $1 AND status = 'NEW' AND next_at <= NOW()
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(claimer)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_outbox(&r)?)),
            None => Ok(None),
        }
    }

    async fn sweep_batch(&self, limit: i64, claimer: &str) -> OutboxResult<Vec<OutboxRow>> {
        let rows = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'CLAIMED', claimed_by = $2, claimed_at = NOW()
            WHERE id IN (
                SELECT id FROM outbox
                WHERE (status = 'NEW' OR status = 'FAILED') AND next_at <= NOW()
                ORDER BY id ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(claimer)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(row_to_outbox)
            .collect::<Result<Vec<_>, _>>()
            .map_err(OutboxError::from)
    }

    async fn mark_published(&self, id: i64) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'PUBLISHED', published_at = NOW(), last_error = NULL
            WHERE id = $1 AND status = 'CLAIMED'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(outbox_id = id, "mark_published found no claimed row");
            return Err(OutboxError::RowNotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str, next_at: DateTime<Utc>) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'FAILED', last_error = $2, next_at = $3, attempts = attempts + 1
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::RowNotFound(id));
        }
        warn!(outbox_id = id, error, "outbox row marked failed");
        Ok(())
    }

    async fn reschedule(&self, id: i64, backoff_ms: i64, error: &str) -> OutboxResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'NEW',
                next_at = NOW() + ($2 || ' milliseconds')::interval,
                attempts = attempts + 1,
                last_error = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(backoff_ms.to_string())
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::RowNotFound(id));
        }
        Ok(())
    }

    async fn recover_stuck(&self, max_claim_age: chrono::Duration) -> OutboxResult<u64> {
        let cutoff = Utc::now() - max_claim_age;
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'NEW', claimed_by = NULL, claimed_at = NULL
            WHERE status = 'CLAIMED' AND claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(recovered, "recovered stuck outbox claims");
        }
        Ok(recovered)
    }
}

/// Convenience conversion so callers can pass `std::time::Duration`
/// straight into [`OutboxRepository::recover_stuck`].
pub fn std_duration_to_chrono(d: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::seconds(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> PgOutboxRepository {
        PgOutboxRepository::new(PgPool::connect_lazy("postgresql://localhost/test").unwrap())
    }

    #[test]
    fn construction_does_not_touch_the_network() {
        let _ = repo();
    }

    #[test]
    fn category_round_trips_through_display_and_parse() {
        for c in [
            OutboxCategory::Command,
            OutboxCategory::Reply,
            OutboxCategory::Event,
        ] {
            let s = c.to_string();
            assert_eq!(s.parse::<OutboxCategory>().unwrap(), c);
        }
    }

    #[test]
    fn unrecognized_category_parses_to_err_not_a_default_variant() {
        assert!("COMMAND".parse::<OutboxCategory>().is_err());
        assert!("carrier-pigeon".parse::<OutboxCategory>().is_err());
    }

    #[test]
    fn status_round_trips_through_display_and_parse() {
        for s in [
            OutboxStatus::New,
            OutboxStatus::Claimed,
            OutboxStatus::Published,
            OutboxStatus::Failed,
        ] {
            assert_eq!(s.to_string().parse::<OutboxStatus>().unwrap(), s);
        }
    }
}
