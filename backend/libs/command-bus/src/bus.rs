//! `CommandBus::accept` (C8), implementing spec.md §4.5's transaction
//! exactly: idempotency pre-check, command insert, outbox insert, then
//! — only after commit — fast-path notifier registration.

use std::sync::Arc;

use messaging_core::{QueueNaming, Store};
use notifier::OutboxNotifier;
use outbox::OutboxRepository;
use tracing::info;
use uuid::Uuid;

use crate::error::{CommandBusError, CommandBusResult};
use crate::repository::CommandRepository;

/// Destination queue name for a command under the default naming
/// convention (`cmd.<name>`). Kept as a pure function so tests and
/// callers that just want the default shape don't need a `QueueNaming`
/// in hand; [`CommandBus`] itself routes through the configured
/// [`QueueNaming`] instead of this function.
pub fn queue_for(name: &str) -> String {
    QueueNaming::default().command_queue(name)
}

pub struct CommandBus<C: CommandRepository, O: OutboxRepository> {
    store: Store,
    commands: Arc<C>,
    outbox: Arc<O>,
    notifier: OutboxNotifier,
    naming: QueueNaming,
}

impl<C: CommandRepository, O: OutboxRepository> CommandBus<C, O> {
    pub fn new(store: Store, commands: Arc<C>, outbox: Arc<O>, notifier: OutboxNotifier) -> Self {
        Self::with_naming(store, commands, outbox, notifier, QueueNaming::default())
    }

    pub fn with_naming(
        store: Store,
        commands: Arc<C>,
        outbox: Arc<O>,
        notifier: OutboxNotifier,
        naming: QueueNaming,
    ) -> Self {
        Self {
            store,
            commands,
            outbox,
            notifier,
            naming,
        }
    }

    pub async fn accept(
        &self,
        name: &str,
        idempotency_key: &str,
        business_key: &str,
        payload: &str,
        reply_spec: serde_json::Value,
    ) -> CommandBusResult<Uuid> {
        let name = name.to_string();
        let idempotency_key = idempotency_key.to_string();
        let business_key = business_key.to_string();
        let payload = payload.to_string();
        let command_id = Uuid::new_v4();

        let commands = Arc::clone(&self.commands);
        let outbox = Arc::clone(&self.outbox);
        let notifier = self.notifier.clone();
        let queue = self.naming.command_queue(&name);
        let queue_for_log = queue.clone();

        let outbox_id = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    if commands
                        .exists_by_idempotency_key(tx, &idempotency_key)
                        .await?
                    {
                        return Err(CommandBusError::DuplicateIdempotencyKey(idempotency_key));
                    }

                    commands
                        .insert_pending(
                            tx,
                            command_id,
                            &name,
                            &idempotency_key,
                            &business_key,
                            &payload,
                            &reply_spec,
                        )
                        .await?;

                    let outbox_id = outbox
                        .insert_returning_id(
                            tx,
                            "command",
                            &queue,
                            Some(&command_id.to_string()),
                            "CommandRequested",
                            &payload,
                            None,
                        )
                        .await?;

                    let notifier = notifier.clone();
                    tx.after_commit(move || notifier.register(outbox_id));

                    Ok(outbox_id)
                })
            })
            .await?;

        info!(%command_id, name = %queue_for_log, outbox_id, "command accepted");
        Ok(command_id)
    }
}
