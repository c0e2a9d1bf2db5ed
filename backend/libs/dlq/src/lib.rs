//! # Dead-letter service (C4)
//!
//! Parks a command that failed permanently, with enough diagnostic
//! context (the status it failed at, the error class and message, the
//! attempt count, and who parked it) that an operator can act on the
//! row without cross-referencing logs.
//!
//! New relative to the teacher — Nova's outbox has no DLQ concept — so
//! this is grounded on the general park-on-terminal-failure pattern
//! visible in the `other_examples/` job-queue crates, built in the
//! teacher's own `sqlx::query` + `Row` mapping idiom.

mod error;

pub use error::{DlqError, DlqResult};

use async_trait::async_trait;
use messaging_core::TxScope;
use tracing::warn;
use uuid::Uuid;

#[async_trait]
pub trait DlqRepository: Send + Sync {
    /// Park a permanently failed command. Runs inside the caller's
    /// transaction (the executor's single write transaction for
    /// `process(envelope)`), so the park and the command/outbox
    /// finalization it sits alongside commit or roll back together.
    #[allow(clippy::too_many_arguments)]
    async fn park(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        name: &str,
        business_key: &str,
        payload: &str,
        failed_status: &str,
        error_class: &str,
        error_message: &str,
        attempts: i32,
        parked_by: &str,
    ) -> DlqResult<Uuid>;
}

#[derive(Default)]
pub struct PgDlqRepository;

impl PgDlqRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DlqRepository for PgDlqRepository {
    async fn park(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        name: &str,
        business_key: &str,
        payload: &str,
        failed_status: &str,
        error_class: &str,
        error_message: &str,
        attempts: i32,
        parked_by: &str,
    ) -> DlqResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO dlq (id, command_id, name, business_key, payload, failed_status, error_class, error_message, attempts, parked_by, parked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            "#,
        )
        .bind(id)
        .bind(command_id)
        .bind(name)
        .bind(business_key)
        .bind(payload)
        .bind(failed_status)
        .bind(error_class)
        .bind(error_message)
        .bind(attempts)
        .bind(parked_by)
        .execute(&mut *tx.tx)
        .await?;

        warn!(
            dlq_id = %id,
            command_id = %command_id,
            name,
            error_class,
            "command parked to dead-letter queue"
        );

        Ok(id)
    }
}
