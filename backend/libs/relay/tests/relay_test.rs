//! Exercises `OutboxRelay::publish_now`/`sweep_once` against a real
//! Postgres database and in-memory transport doubles. `#[ignore]` +
//! `DATABASE_URL`, mirroring `db-pool`'s database test convention.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use messaging_core::{Store, TxScope};
use outbox::{OutboxRepository, PgOutboxRepository};
use relay::{EventPublisher, MqPublisher, OutboxRelay, RelayConfig};
use sqlx::postgres::PgPoolOptions;

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<(String, String)>>,
    fail_next: Mutex<usize>,
}

#[async_trait]
impl MqPublisher for RecordingPublisher {
    async fn send(
        &self,
        topic: &str,
        _key: Option<&str>,
        r#type: &str,
        _payload: &str,
        _headers: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut remaining = self.fail_next.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            anyhow::bail!("simulated transport failure");
        }
        self.sent
            .lock()
            .unwrap()
            .push((topic.to_string(), r#type.to_string()));
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        r#type: &str,
        payload: &str,
        headers: &serde_json::Value,
    ) -> anyhow::Result<()> {
        self.send(topic, key, r#type, payload, headers).await
    }
}

async fn test_store() -> Store {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for this test");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    sqlx::migrate!("../outbox/migrations")
        .run(&pool)
        .await
        .expect("failed to run outbox migrations");
    Store::new(pool)
}

async fn insert_event_row(store: &Store, repo: &Arc<PgOutboxRepository>, topic: &str) -> i64 {
    let repo = Arc::clone(repo);
    let topic = topic.to_string();
    store
        .transaction(move |tx: &mut TxScope<'_>| {
            let repo = Arc::clone(&repo);
            Box::pin(async move {
                repo.insert_returning_id(tx, "event", &topic, None, "OrderShipped", "{}", None)
                    .await
            })
        })
        .await
        .expect("insert should succeed")
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn publish_now_dispatches_and_marks_published() {
    let store = test_store().await;
    let repo = Arc::new(PgOutboxRepository::new(store.pool().clone()));
    let id = insert_event_row(&store, &repo, "events.order-shipped").await;

    let publisher = Arc::new(RecordingPublisher::default());
    let relay = OutboxRelay::new(
        Arc::clone(&repo),
        publisher.clone(),
        publisher.clone(),
        RelayConfig::default(),
    );

    relay.publish_now(id).await;

    let sent = publisher.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], ("events.order-shipped".to_string(), "OrderShipped".to_string()));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn publish_now_is_a_no_op_on_a_second_claim_attempt() {
    let store = test_store().await;
    let repo = Arc::new(PgOutboxRepository::new(store.pool().clone()));
    let id = insert_event_row(&store, &repo, "events.test").await;

    let publisher = Arc::new(RecordingPublisher::default());
    let relay = OutboxRelay::new(
        Arc::clone(&repo),
        publisher.clone(),
        publisher.clone(),
        RelayConfig::default(),
    );

    relay.publish_now(id).await;
    relay.publish_now(id).await;

    assert_eq!(publisher.sent.lock().unwrap().len(), 1, "a published row must never be re-dispatched");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn sweep_once_reschedules_a_failed_dispatch_instead_of_marking_failed() {
    let store = test_store().await;
    let repo = Arc::new(PgOutboxRepository::new(store.pool().clone()));
    let id = insert_event_row(&store, &repo, "events.test").await;

    let publisher = Arc::new(RecordingPublisher::default());
    *publisher.fail_next.lock().unwrap() = 1;
    let relay = OutboxRelay::new(
        Arc::clone(&repo),
        publisher.clone(),
        publisher.clone(),
        RelayConfig::default(),
    );

    let claimed = relay.sweep_once().await.expect("sweep_once should succeed");
    assert_eq!(claimed, 1);
    assert!(publisher.sent.lock().unwrap().is_empty());

    let row = repo
        .claim_if_new(id, "verify-claimer")
        .await
        .expect("claim should not error");
    assert!(
        row.is_none(),
        "reschedule sets next_at in the future, so the row must not be immediately claimable"
    );
}
