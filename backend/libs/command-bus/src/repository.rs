//! Command persistence (part of C4), grounded on the `idempotent_consumer`
//! repository idiom (insert + `rows_affected` check for the duplicate
//! path) but against the `command` table's richer lifecycle instead of
//! a bare `processed_events` marker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use messaging_core::{CommandRow, CommandStatus, TxScope};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{CommandBusError, CommandBusResult};

#[async_trait]
pub trait CommandRepository: Send + Sync {
    async fn exists_by_idempotency_key(
        &self,
        tx: &mut TxScope<'_>,
        idempotency_key: &str,
    ) -> CommandBusResult<bool>;

    async fn insert_pending(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        name: &str,
        idempotency_key: &str,
        business_key: &str,
        payload: &str,
        reply_spec: &serde_json::Value,
    ) -> CommandBusResult<()>;

    async fn mark_running(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        lease_until: DateTime<Utc>,
    ) -> CommandBusResult<CommandRow>;

    async fn mark_succeeded(&self, tx: &mut TxScope<'_>, command_id: Uuid) -> CommandBusResult<()>;

    async fn mark_failed(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        error: &str,
    ) -> CommandBusResult<()>;

    async fn bump_retry(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        error: &str,
    ) -> CommandBusResult<()>;
}

#[derive(Default)]
pub struct PgCommandRepository;

impl PgCommandRepository {
    pub fn new() -> Self {
        Self
    }
}

fn row_to_command(row: &sqlx::postgres::PgRow) -> Result<CommandRow, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    Ok(CommandRow {
        command_id: row.try_get("command_id")?,
        name: row.try_get("name")?,
        idempotency_key: row.try_get("idempotency_key")?,
        business_key: row.try_get("business_key")?,
        payload: row.try_get("payload")?,
        reply_spec: row.try_get("reply_spec")?,
        status: status_raw.parse().unwrap_or(CommandStatus::Pending),
        retries: row.try_get("retries")?,
        last_error: row.try_get("last_error")?,
        lease_until: row.try_get("lease_until")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl CommandRepository for PgCommandRepository {
    async fn exists_by_idempotency_key(
        &self,
        tx: &mut TxScope<'_>,
        idempotency_key: &str,
    ) -> CommandBusResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM command WHERE idempotency_key = $1) AS exists",
        )
        .bind(idempotency_key)
        .fetch_one(&mut *tx.tx)
        .await?;

        Ok(row.try_get("exists")?)
    }

    async fn insert_pending(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        name: &str,
        idempotency_key: &str,
        business_key: &str,
        payload: &str,
        reply_spec: &serde_json::Value,
    ) -> CommandBusResult<()> {
        sqlx::query(
            r#"
            INSERT INTO command (command_id, name, idempotency_key, business_key, payload, reply_spec, status, retries, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', 0, NOW())
            "#,
        )
        .bind(command_id)
        .bind(name)
        .bind(idempotency_key)
        .bind(business_key)
        .bind(payload)
        .bind(reply_spec)
        .execute(&mut *tx.tx)
        .await?;

        Ok(())
    }

    async fn mark_running(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        lease_until: DateTime<Utc>,
    ) -> CommandBusResult<CommandRow> {
        let row = sqlx::query(
            r#"
            UPDATE command SET status = 'RUNNING', lease_until = $2
            WHERE command_id = $1
            RETURNING *
            "#,
        )
        .bind(command_id)
        .bind(lease_until)
        .fetch_optional(&mut *tx.tx)
        .await?
        .ok_or(CommandBusError::CommandNotFound(command_id))?;

        Ok(row_to_command(&row)?)
    }

    async fn mark_succeeded(&self, tx: &mut TxScope<'_>, command_id: Uuid) -> CommandBusResult<()> {
        sqlx::query("UPDATE command SET status = 'SUCCEEDED' WHERE command_id = $1")
            .bind(command_id)
            .execute(&mut *tx.tx)
            .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        error: &str,
    ) -> CommandBusResult<()> {
        sqlx::query("UPDATE command SET status = 'FAILED', last_error = $2 WHERE command_id = $1")
            .bind(command_id)
            .bind(error)
            .execute(&mut *tx.tx)
            .await?;
        Ok(())
    }

    async fn bump_retry(
        &self,
        tx: &mut TxScope<'_>,
        command_id: Uuid,
        error: &str,
    ) -> CommandBusResult<()> {
        sqlx::query(
            r#"
            UPDATE command SET retries = retries + 1, last_error = $2, status = 'PENDING'
            WHERE command_id = $1
            "#,
        )
        .bind(command_id)
        .bind(error)
        .execute(&mut *tx.tx)
        .await?;
        Ok(())
    }
}
