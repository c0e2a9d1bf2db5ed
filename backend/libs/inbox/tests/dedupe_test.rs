//! Exercises inbox dedupe against a real Postgres database. `#[ignore]` +
//! `DATABASE_URL`, mirroring `db-pool`'s database test convention.

use inbox::{InboxRepository, PgInboxRepository};
use messaging_core::{Store, TxScope};
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
        .expect("failed to run inbox migrations");
    Store::new(pool)
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn second_delivery_of_the_same_message_is_rejected() {
    let store = test_store().await;
    let repo = PgInboxRepository::new();
    let message_id = format!("evt-{}", uuid::Uuid::new_v4());

    let first = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = &repo;
            let message_id = message_id.clone();
            Box::pin(async move { repo.insert_if_absent(tx, &message_id, "OrderService").await })
        })
        .await
        .unwrap();
    assert!(first, "first delivery should be accepted");

    let second = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = &repo;
            let message_id = message_id.clone();
            Box::pin(async move { repo.insert_if_absent(tx, &message_id, "OrderService").await })
        })
        .await
        .unwrap();
    assert!(!second, "redelivery of the same message should be rejected");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn same_message_different_consumers_are_independent() {
    let store = test_store().await;
    let repo = PgInboxRepository::new();
    let message_id = format!("evt-{}", uuid::Uuid::new_v4());

    let first = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = &repo;
            let message_id = message_id.clone();
            Box::pin(async move { repo.insert_if_absent(tx, &message_id, "ConsumerA").await })
        })
        .await
        .unwrap();
    let second = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = &repo;
            let message_id = message_id.clone();
            Box::pin(async move { repo.insert_if_absent(tx, &message_id, "ConsumerB").await })
        })
        .await
        .unwrap();

    assert!(first);
    assert!(second, "a different consumer should not see the first's dedupe row");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn portable_form_matches_native_form_semantics() {
    let store = test_store().await;
    let repo = PgInboxRepository::new();
    let message_id = format!("evt-{}", uuid::Uuid::new_v4());

    let first = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = &repo;
            let message_id = message_id.clone();
            Box::pin(async move {
                repo.insert_if_absent_portable(tx, &message_id, "PortableConsumer")
                    .await
            })
        })
        .await
        .unwrap();
    let second = store
        .transaction(|tx: &mut TxScope<'_>| {
            let repo = &repo;
            let message_id = message_id.clone();
            Box::pin(async move {
                repo.insert_if_absent_portable(tx, &message_id, "PortableConsumer")
                    .await
            })
        })
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
}
