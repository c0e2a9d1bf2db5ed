//! Exercises `ProcessManager::start_process`/`handle_reply` end to end
//! against real Postgres and Redis. `#[ignore]` + `DATABASE_URL`/
//! `REDIS_URL`, mirroring `command-bus`'s database-and-Redis test
//! convention.

use std::collections::HashMap;
use std::sync::Arc;

use command_bus::{CommandBus, PgCommandRepository};
use messaging_core::{CommandReply, ProcessStatus, Store};
use notifier::OutboxNotifier;
use outbox::PgOutboxRepository;
use process_manager::{PgProcessRepository, ProcessConfiguration, ProcessManager, ProcessRegistry};
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;

type TestManager = ProcessManager<PgProcessRepository, PgCommandRepository, PgOutboxRepository>;

async fn test_manager(config: ProcessConfiguration) -> (TestManager, Store) {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for this test");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    sqlx::migrate!("../command-bus/migrations").run(&pool).await.unwrap();
    sqlx::migrate!("../outbox/migrations").run(&pool).await.unwrap();

    let client = redis::Client::open(redis_url).expect("invalid REDIS_URL");
    let manager = ConnectionManager::new(client).await.expect("redis connect failed");

    let store = Store::new(pool.clone());
    let commands = Arc::new(PgCommandRepository::new());
    let outbox = Arc::new(PgOutboxRepository::new(pool.clone()));
    let notifier = OutboxNotifier::new(manager);
    let bus = Arc::new(CommandBus::new(store.clone(), commands, outbox, notifier));

    let registry = Arc::new(ProcessRegistry::new());
    registry.register(config).expect("registration should succeed");

    let repository = Arc::new(PgProcessRepository::new());
    let pm = ProcessManager::new(store.clone(), repository, registry, bus);
    (pm, store)
}

fn two_step_config(process_type: &str) -> ProcessConfiguration {
    ProcessConfiguration::builder(process_type)
        .start_with("reserve-inventory")
        .then("ship-order")
        .end()
}

async fn load_status(store: &Store, process_id: uuid::Uuid) -> ProcessStatus {
    let row = sqlx::query("SELECT status FROM process_instance WHERE process_id = $1")
        .bind(process_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    let status: String = row.try_get("status").unwrap();
    status.parse().unwrap()
}

#[tokio::test]
#[ignore = "Requires PostgreSQL and Redis"]
async fn start_process_persists_new_instance_and_issues_first_step() {
    let process_type = format!("order-fulfillment-{}", uuid::Uuid::new_v4());
    let (pm, store) = test_manager(two_step_config(&process_type)).await;

    let process_id = pm
        .start_process(&process_type, "order-1", HashMap::new())
        .await
        .expect("start_process should succeed");

    assert_eq!(load_status(&store, process_id).await, ProcessStatus::Running);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL and Redis"]
async fn completing_every_step_in_order_succeeds_the_process() {
    let process_type = format!("order-fulfillment-{}", uuid::Uuid::new_v4());
    let (pm, store) = test_manager(two_step_config(&process_type)).await;

    let process_id = pm
        .start_process(&process_type, "order-2", HashMap::new())
        .await
        .unwrap();

    pm.handle_reply(
        process_id,
        CommandReply::completed(uuid::Uuid::new_v4(), HashMap::from([(
            "reserved_sku".to_string(),
            serde_json::json!("sku-1"),
        )])),
    )
    .await;
    assert_eq!(load_status(&store, process_id).await, ProcessStatus::Running);

    pm.handle_reply(
        process_id,
        CommandReply::completed(uuid::Uuid::new_v4(), HashMap::from([(
            "shipment_id".to_string(),
            serde_json::json!("ship-1"),
        )])),
    )
    .await;
    assert_eq!(load_status(&store, process_id).await, ProcessStatus::Succeeded);

    let row_count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM process_log WHERE process_id = $1")
        .bind(process_id)
        .fetch_one(store.pool())
        .await
        .unwrap()
        .try_get("n")
        .unwrap();
    assert!(row_count >= 5, "expected at least ProcessStarted/StepStarted/StepCompleted/StepStarted/ProcessCompleted");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL and Redis"]
async fn unknown_process_id_is_swallowed_without_mutation() {
    let process_type = format!("order-fulfillment-{}", uuid::Uuid::new_v4());
    let (pm, _store) = test_manager(two_step_config(&process_type)).await;

    // No panic, no error surfaced: handle_reply for an id nobody started.
    pm.handle_reply(
        uuid::Uuid::new_v4(),
        CommandReply::completed(uuid::Uuid::new_v4(), HashMap::new()),
    )
    .await;
}
