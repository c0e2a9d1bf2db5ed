//! Persistence for process instances and their append-only event log
//! (part of C4), in the same `sqlx::query` + `Row` mapping idiom as the
//! rest of the messaging core's repositories.

use async_trait::async_trait;
use messaging_core::{ProcessEvent, ProcessInstance, ProcessLogEntry, ProcessStatus, TxScope};
use sqlx::Row;
use uuid::Uuid;

use crate::error::ProcessResult;

#[async_trait]
pub trait ProcessRepository: Send + Sync {
    async fn insert_new(&self, tx: &mut TxScope<'_>, instance: &ProcessInstance) -> ProcessResult<()>;

    async fn load(&self, tx: &mut TxScope<'_>, process_id: Uuid) -> ProcessResult<Option<ProcessInstance>>;

    async fn save(&self, tx: &mut TxScope<'_>, instance: &ProcessInstance) -> ProcessResult<()>;

    async fn append_event(
        &self,
        tx: &mut TxScope<'_>,
        process_id: Uuid,
        event: &ProcessEvent,
    ) -> ProcessResult<i64>;
}

#[derive(Default)]
pub struct PgProcessRepository;

impl PgProcessRepository {
    pub fn new() -> Self {
        Self
    }
}

fn row_to_instance(row: &sqlx::postgres::PgRow) -> Result<ProcessInstance, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let data_json: serde_json::Value = row.try_get("data")?;
    let data = match data_json {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => Default::default(),
    };
    Ok(ProcessInstance {
        process_id: row.try_get("process_id")?,
        process_type: row.try_get("process_type")?,
        business_key: row.try_get("business_key")?,
        status: status_raw.parse().unwrap_or(ProcessStatus::New),
        current_step: row.try_get("current_step")?,
        data,
        retries: row.try_get("retries")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ProcessRepository for PgProcessRepository {
    async fn insert_new(&self, tx: &mut TxScope<'_>, instance: &ProcessInstance) -> ProcessResult<()> {
        let data = serde_json::to_value(&instance.data)?;
        sqlx::query(
            r#"
            INSERT INTO process_instance (process_id, process_type, business_key, status, current_step, data, retries, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            "#,
        )
        .bind(instance.process_id)
        .bind(&instance.process_type)
        .bind(&instance.business_key)
        .bind(instance.status.to_string())
        .bind(&instance.current_step)
        .bind(&data)
        .bind(instance.retries)
        .execute(&mut *tx.tx)
        .await?;

        Ok(())
    }

    async fn load(&self, tx: &mut TxScope<'_>, process_id: Uuid) -> ProcessResult<Option<ProcessInstance>> {
        let row = sqlx::query("SELECT * FROM process_instance WHERE process_id = $1 FOR UPDATE")
            .bind(process_id)
            .fetch_optional(&mut *tx.tx)
            .await?;

        match row {
            Some(r) => Ok(Some(row_to_instance(&r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, tx: &mut TxScope<'_>, instance: &ProcessInstance) -> ProcessResult<()> {
        let data = serde_json::to_value(&instance.data)?;
        sqlx::query(
            r#"
            UPDATE process_instance
            SET status = $2, current_step = $3, data = $4, retries = $5, updated_at = NOW()
            WHERE process_id = $1
            "#,
        )
        .bind(instance.process_id)
        .bind(instance.status.to_string())
        .bind(&instance.current_step)
        .bind(&data)
        .bind(instance.retries)
        .execute(&mut *tx.tx)
        .await?;

        Ok(())
    }

    async fn append_event(
        &self,
        tx: &mut TxScope<'_>,
        process_id: Uuid,
        event: &ProcessEvent,
    ) -> ProcessResult<i64> {
        let next_seq_row = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) + 1 AS next_seq FROM process_log WHERE process_id = $1",
        )
        .bind(process_id)
        .fetch_one(&mut *tx.tx)
        .await?;
        let sequence: i64 = next_seq_row.try_get("next_seq")?;

        let event_json = serde_json::to_value(event)?;
        sqlx::query(
            r#"
            INSERT INTO process_log (process_id, sequence, timestamp, event)
            VALUES ($1, $2, NOW(), $3)
            "#,
        )
        .bind(process_id)
        .bind(sequence)
        .bind(&event_json)
        .execute(&mut *tx.tx)
        .await?;

        Ok(sequence)
    }
}

/// Convenience: build a [`ProcessLogEntry`] for callers that want the
/// full row shape (e.g. admin tooling) rather than just the sequence.
pub fn log_entry(process_id: Uuid, sequence: i64, event: ProcessEvent) -> ProcessLogEntry {
    ProcessLogEntry {
        process_id,
        sequence,
        timestamp: chrono::Utc::now(),
        event,
    }
}
