//! Exercises `CommandBus::accept` against real Postgres and Redis.
//! `#[ignore]` + `DATABASE_URL`/`REDIS_URL`, mirroring `db-pool`'s
//! database test convention.

use std::sync::Arc;

use command_bus::{CommandBus, CommandBusError, PgCommandRepository};
use messaging_core::Store;
use notifier::OutboxNotifier;
use outbox::PgOutboxRepository;
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;

async fn test_bus() -> CommandBus<PgCommandRepository, PgOutboxRepository> {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for this test");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run command migrations");
    sqlx::migrate!("../outbox/migrations")
        .run(&pool)
        .await
        .expect("failed to run outbox migrations");

    let client = redis::Client::open(redis_url).expect("invalid REDIS_URL");
    let manager = ConnectionManager::new(client)
        .await
        .expect("failed to connect to redis");

    let store = Store::new(pool.clone());
    let commands = Arc::new(PgCommandRepository::new());
    let outbox = Arc::new(PgOutboxRepository::new(pool));
    let notifier = OutboxNotifier::new(manager);

    CommandBus::new(store, commands, outbox, notifier)
}

#[tokio::test]
#[ignore = "Requires PostgreSQL and Redis"]
async fn accept_writes_a_command_and_an_outbox_row() {
    let bus = test_bus().await;
    let idempotency_key = format!("key-{}", uuid::Uuid::new_v4());

    let command_id = bus
        .accept(
            "ship-order",
            &idempotency_key,
            "order-42",
            r#"{"order_id":"order-42"}"#,
            serde_json::json!({}),
        )
        .await
        .expect("accept should succeed");

    assert!(!command_id.is_nil());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL and Redis"]
async fn accept_rejects_a_repeated_idempotency_key() {
    let bus = test_bus().await;
    let idempotency_key = format!("key-{}", uuid::Uuid::new_v4());

    bus.accept(
        "ship-order",
        &idempotency_key,
        "order-43",
        "{}",
        serde_json::json!({}),
    )
    .await
    .expect("first accept should succeed");

    let err = bus
        .accept(
            "ship-order",
            &idempotency_key,
            "order-43",
            "{}",
            serde_json::json!({}),
        )
        .await
        .expect_err("second accept with the same idempotency key should fail");

    assert!(matches!(err, CommandBusError::DuplicateIdempotencyKey(_)));
}
