//! Exercises the outbox row lifecycle against a real Postgres database.
//! Mirrors `db-pool`'s `#[ignore]` + `DATABASE_URL` convention: these run
//! only where a database is reachable, never in a default `cargo test`.

use std::sync::Arc;

use messaging_core::{OutboxStatus, Store, TxScope};
use outbox::{OutboxRepository, PgOutboxRepository};
use sqlx::postgres::PgPoolOptions;

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
        .expect("failed to run outbox migrations");
    Store::new(pool)
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn insert_then_sweep_claims_and_publishes() {
    let store = test_store().await;
    let repo = Arc::new(PgOutboxRepository::new(store.pool().clone()));

    let id = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = Arc::clone(&repo);
            Box::pin(async move {
                repo.insert_returning_id(
                    tx,
                    "event",
                    "events.order-shipped",
                    Some("order-1"),
                    "OrderShipped",
                    r#"{"order_id":"order-1"}"#,
                    None,
                )
                .await
            })
        })
        .await
        .expect("insert should succeed");

    let claimed = repo
        .sweep_batch(10, "test-claimer")
        .await
        .expect("sweep should succeed");
    assert!(claimed.iter().any(|row| row.id == id));
    let row = claimed.iter().find(|row| row.id == id).unwrap();
    assert_eq!(row.status, OutboxStatus::Claimed);
    assert_eq!(row.claimed_by.as_deref(), Some("test-claimer"));

    repo.mark_published(id).await.expect("mark_published should succeed");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn sweep_does_not_reclaim_rows_already_claimed() {
    let store = test_store().await;
    let repo = Arc::new(PgOutboxRepository::new(store.pool().clone()));

    let id = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = Arc::clone(&repo);
            Box::pin(async move {
                repo.insert_returning_id(
                    tx,
                    "event",
                    "events.order-shipped",
                    None,
                    "OrderShipped",
                    "{}",
                    None,
                )
                .await
            })
        })
        .await
        .expect("insert should succeed");

    let first = repo.sweep_batch(10, "claimer-a").await.unwrap();
    assert!(first.iter().any(|row| row.id == id));

    let second = repo.sweep_batch(10, "claimer-b").await.unwrap();
    assert!(!second.iter().any(|row| row.id == id));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn mark_failed_reschedules_for_a_future_retry() {
    let store = test_store().await;
    let repo = Arc::new(PgOutboxRepository::new(store.pool().clone()));

    let id = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = Arc::clone(&repo);
            Box::pin(async move {
                repo.insert_returning_id(tx, "event", "events.test", None, "Test", "{}", None)
                    .await
            })
        })
        .await
        .unwrap();

    let claimed = repo.claim_if_new(id, "claimer").await.unwrap();
    assert!(claimed.is_some());

    let next_at = chrono::Utc::now() + chrono::Duration::seconds(30);
    repo.mark_failed(id, "transport unavailable", next_at)
        .await
        .expect("mark_failed should succeed");

    let rows = repo.sweep_batch(10, "claimer-2").await.unwrap();
    assert!(
        !rows.iter().any(|row| row.id == id),
        "a row rescheduled in the future should not be immediately re-claimable"
    );
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn recover_stuck_reclaims_rows_past_the_claim_age() {
    let store = test_store().await;
    let repo = Arc::new(PgOutboxRepository::new(store.pool().clone()));

    let id = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = Arc::clone(&repo);
            Box::pin(async move {
                repo.insert_returning_id(tx, "event", "events.test", None, "Test", "{}", None)
                    .await
            })
        })
        .await
        .unwrap();

    repo.claim_if_new(id, "crashed-claimer").await.unwrap();

    let recovered = repo
        .recover_stuck(chrono::Duration::seconds(-1))
        .await
        .expect("recover_stuck should succeed");
    assert!(recovered >= 1);

    let rows = repo.sweep_batch(10, "recovery-claimer").await.unwrap();
    assert!(rows.iter().any(|row| row.id == id));
}
