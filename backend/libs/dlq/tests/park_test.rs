//! Exercises `DlqRepository::park` against a real Postgres database.
//! `#[ignore]` + `DATABASE_URL`, mirroring `db-pool`'s database test
//! convention.

use dlq::{DlqRepository, PgDlqRepository};
use messaging_core::{Store, TxScope};
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;

async fn test_store() -> Store {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run dlq migrations");
    Store::new(pool)
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn park_inserts_full_diagnostic_row() {
    let store = test_store().await;
    let repo = PgDlqRepository::new();
    let command_id = uuid::Uuid::new_v4();

    let dlq_id = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = &repo;
            Box::pin(async move {
                repo.park(
                    tx,
                    command_id,
                    "ship-order",
                    "order-99",
                    r#"{"order_id":"order-99"}"#,
                    "FAILED",
                    "PermanentException",
                    "address is undeliverable",
                    2,
                    "CommandExecutor",
                )
                .await
            })
        })
        .await
        .expect("park should succeed");

    let row = sqlx::query("SELECT * FROM dlq WHERE id = $1")
        .bind(dlq_id)
        .fetch_one(store.pool())
        .await
        .expect("parked row should be readable");

    let parked_command_id: uuid::Uuid = row.try_get("command_id").unwrap();
    let error_class: String = row.try_get("error_class").unwrap();
    let attempts: i32 = row.try_get("attempts").unwrap();
    assert_eq!(parked_command_id, command_id);
    assert_eq!(error_class, "PermanentException");
    assert_eq!(attempts, 2);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn park_rolls_back_with_the_surrounding_transaction() {
    let store = test_store().await;
    let repo = PgDlqRepository::new();
    let command_id = uuid::Uuid::new_v4();

    let result: Result<(), dlq::DlqError> = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = &repo;
            Box::pin(async move {
                repo.park(
                    tx,
                    command_id,
                    "ship-order",
                    "order-1",
                    "{}",
                    "FAILED",
                    "PermanentException",
                    "boom",
                    0,
                    "CommandExecutor",
                )
                .await?;
                // Force a rollback by returning an error after the park.
                Err(sqlx::Error::RowNotFound.into())
            })
        })
        .await;
    assert!(result.is_err());

    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM dlq WHERE command_id = $1")
        .bind(command_id)
        .fetch_one(store.pool())
        .await
        .unwrap()
        .try_get("n")
        .unwrap();
    assert_eq!(count, 0, "a rolled-back transaction must not leave a parked row behind");
}
