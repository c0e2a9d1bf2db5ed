//! # Inbox repository (C3)
//!
//! Records that `(message_id, consumer)` has already been accepted, so a
//! redelivered command or event is recognized and skipped instead of
//! re-applied. Grounded on
//! `idempotent_consumer::IdempotencyGuard::mark_processed`: same
//! insert-and-check-`rows_affected` idiom, generalized from a single
//! `event_id` key to the `(message_id, consumer)` composite the command
//! bus and process manager both need (one message can be consumed by
//! more than one subsystem without colliding).

mod error;

pub use error::{InboxError, InboxResult};

use async_trait::async_trait;
use chrono::Utc;
use messaging_core::TxScope;
use tracing::debug;

/// Repository trait for the inbox table (C3). Both operations must run
/// through the caller's [`TxScope`] so the dedupe check and the
/// business write it guards commit or roll back together.
#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Insert `(message_id, consumer)` iff absent, using the database's
    /// native upsert. Returns `true` if this call performed the insert
    /// (message is new), `false` if the row already existed (duplicate).
    async fn insert_if_absent(
        &self,
        tx: &mut TxScope<'_>,
        message_id: &str,
        consumer: &str,
    ) -> InboxResult<bool>;

    /// Same contract as [`InboxRepository::insert_if_absent`], using an
    /// `INSERT ... SELECT ... WHERE NOT EXISTS` form for stores without
    /// a native `ON CONFLICT` upsert.
    async fn insert_if_absent_portable(
        &self,
        tx: &mut TxScope<'_>,
        message_id: &str,
        consumer: &str,
    ) -> InboxResult<bool>;
}

#[derive(Default)]
pub struct PgInboxRepository;

impl PgInboxRepository {
    pub fn new() -> Self {
        Self
    }

    fn validate(message_id: &str) -> InboxResult<()> {
        if message_id.is_empty() {
            return Err(InboxError::InvalidMessageId(
                "message id cannot be empty".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InboxRepository for PgInboxRepository {
    async fn insert_if_absent(
        &self,
        tx: &mut TxScope<'_>,
        message_id: &str,
        consumer: &str,
    ) -> InboxResult<bool> {
        Self::validate(message_id)?;

        // spec.md §4.2: the native ON CONFLICT form binds exactly 3
        // parameters (message_id, consumer, received_at).
        let result = sqlx::query(
            r#"
            INSERT INTO inbox (message_id, consumer, received_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, consumer) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(consumer)
        .bind(Utc::now())
        .execute(&mut *tx.tx)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!(message_id, consumer, "inbox: duplicate, skipping");
        }
        Ok(inserted)
    }

    async fn insert_if_absent_portable(
        &self,
        tx: &mut TxScope<'_>,
        message_id: &str,
        consumer: &str,
    ) -> InboxResult<bool> {
        Self::validate(message_id)?;

        // spec.md §4.2: the portable WHERE NOT EXISTS form binds exactly
        // 5 parameters (no positional parameter is reused).
        let result = sqlx::query(
            r#"
            INSERT INTO inbox (message_id, consumer, received_at)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (
                SELECT 1 FROM inbox WHERE message_id = $4 AND consumer = $5
            )
            "#,
        )
        .bind(message_id)
        .bind(consumer)
        .bind(Utc::now())
        .bind(message_id)
        .bind(consumer)
        .execute(&mut *tx.tx)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!(message_id, consumer, "inbox (portable): duplicate, skipping");
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_message_id() {
        let err = PgInboxRepository::validate("").unwrap_err();
        assert!(matches!(err, InboxError::InvalidMessageId(_)));
    }

    #[test]
    fn accepts_nonempty_message_id() {
        assert!(PgInboxRepository::validate("evt-1").is_ok());
    }
}
