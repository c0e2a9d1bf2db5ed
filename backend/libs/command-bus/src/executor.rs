//! `TransactionalExecutor::process` (C9), implementing spec.md §4.6 step
//! by step inside one write transaction: inbox-dedupe, lease + dispatch,
//! reply/event outbox writes, and the `Permanent`/`Retryable`/`Transient`
//! branches.

use std::sync::Arc;

use dlq::DlqRepository;
use inbox::InboxRepository;
use messaging_core::{CommandConfig, CommandReply, QueueNaming, ReplyStatus, Store, TopicNaming};
use notifier::OutboxNotifier;
use outbox::OutboxRepository;
use tracing::{info, warn};

use crate::error::{CommandBusError, CommandBusResult, HandlerError};
use crate::registry::{CommandEnvelope, HandlerRegistry};
use crate::repository::CommandRepository;

const INBOX_CONSUMER: &str = "CommandExecutor";

fn reply_event_type(status: ReplyStatus) -> &'static str {
    match status {
        ReplyStatus::Completed => "CommandCompleted",
        ReplyStatus::Failed => "CommandFailed",
        ReplyStatus::TimedOut => "CommandTimedOut",
    }
}

fn reply_topic(reply_spec: &serde_json::Value, naming: &QueueNaming) -> String {
    reply_spec
        .get("reply_topic")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| naming.reply_queue.clone())
}

fn completion_topic(reply_spec: &serde_json::Value, naming: &TopicNaming) -> String {
    reply_spec
        .get("completion_topic")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| naming.event_topic("command-completion"))
}

pub struct TransactionalExecutor<C, O, I, D>
where
    C: CommandRepository,
    O: OutboxRepository,
    I: InboxRepository,
    D: DlqRepository,
{
    store: Store,
    commands: Arc<C>,
    outbox: Arc<O>,
    inbox: Arc<I>,
    dlq: Arc<D>,
    registry: Arc<HandlerRegistry>,
    notifier: OutboxNotifier,
    lease: chrono::Duration,
    queue_naming: QueueNaming,
    topic_naming: TopicNaming,
}

impl<C, O, I, D> TransactionalExecutor<C, O, I, D>
where
    C: CommandRepository,
    O: OutboxRepository,
    I: InboxRepository,
    D: DlqRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        commands: Arc<C>,
        outbox: Arc<O>,
        inbox: Arc<I>,
        dlq: Arc<D>,
        registry: Arc<HandlerRegistry>,
        notifier: OutboxNotifier,
    ) -> Self {
        Self::with_config(
            store,
            commands,
            outbox,
            inbox,
            dlq,
            registry,
            notifier,
            &CommandConfig::default(),
            QueueNaming::default(),
            TopicNaming::default(),
        )
    }

    /// Builds an executor whose `RUNNING` lease duration comes from
    /// `config.command_lease` (spec.md §6) and whose default reply/event
    /// destinations come from `queue_naming`/`topic_naming` (used only
    /// when an envelope's `reply_spec` doesn't override them).
    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        store: Store,
        commands: Arc<C>,
        outbox: Arc<O>,
        inbox: Arc<I>,
        dlq: Arc<D>,
        registry: Arc<HandlerRegistry>,
        notifier: OutboxNotifier,
        config: &CommandConfig,
        queue_naming: QueueNaming,
        topic_naming: TopicNaming,
    ) -> Self {
        Self {
            store,
            commands,
            outbox,
            inbox,
            dlq,
            registry,
            notifier,
            lease: chrono::Duration::from_std(config.command_lease)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
            queue_naming,
            topic_naming,
        }
    }

    /// Runs the whole envelope lifecycle in one write transaction. A
    /// `HandlerError::Retryable`/`Transient` bubbles out as an `Err` so
    /// the caller (the delivery framework) redelivers; `Permanent` is
    /// swallowed into a DLQ park plus a `CommandFailed` reply/event pair.
    pub async fn process(&self, envelope: CommandEnvelope) -> CommandBusResult<()> {
        let handler = self
            .registry
            .get(&envelope.name)
            .ok_or_else(|| CommandBusError::UnknownCommand(envelope.name.clone()))?;

        let commands = Arc::clone(&self.commands);
        let outbox = Arc::clone(&self.outbox);
        let inbox = Arc::clone(&self.inbox);
        let dlq = Arc::clone(&self.dlq);
        let notifier = self.notifier.clone();
        let lease = self.lease;
        let queue_naming = self.queue_naming.clone();
        let topic_naming = self.topic_naming.clone();

        self.store
            .transaction(move |tx| {
                let envelope = envelope.clone();
                let handler = Arc::clone(&handler);
                let commands = Arc::clone(&commands);
                let outbox = Arc::clone(&outbox);
                let inbox = Arc::clone(&inbox);
                let dlq = Arc::clone(&dlq);
                let notifier = notifier.clone();
                let queue_naming = queue_naming.clone();
                let topic_naming = topic_naming.clone();

                Box::pin(async move {
                    let inserted = inbox
                        .insert_if_absent(tx, &envelope.message_id, INBOX_CONSUMER)
                        .await?;
                    if !inserted {
                        info!(command_id = %envelope.command_id, "duplicate delivery, skipping");
                        return Ok(());
                    }

                    let lease_until = chrono::Utc::now() + lease;
                    commands
                        .mark_running(tx, envelope.command_id, lease_until)
                        .await?;

                    match handler.handle(&envelope).await {
                        Ok(reply) => {
                            commands.mark_succeeded(tx, envelope.command_id).await?;
                            Self::write_reply_and_event(
                                tx, &outbox, &notifier, &envelope, &reply, &queue_naming, &topic_naming,
                            )
                            .await?;
                            Ok(())
                        }
                        Err(HandlerError::Permanent(msg)) => {
                            warn!(command_id = %envelope.command_id, error = %msg, "permanent handler failure");
                            commands.mark_failed(tx, envelope.command_id, &msg).await?;
                            dlq.park(
                                tx,
                                envelope.command_id,
                                &envelope.name,
                                &envelope.business_key,
                                &envelope.payload,
                                "FAILED",
                                "PermanentException",
                                &msg,
                                0,
                                INBOX_CONSUMER,
                            )
                            .await?;
                            let reply = CommandReply::failed(envelope.command_id, msg);
                            Self::write_reply_and_event(
                                tx, &outbox, &notifier, &envelope, &reply, &queue_naming, &topic_naming,
                            )
                            .await?;
                            Ok(())
                        }
                        Err(HandlerError::Retryable(msg)) => {
                            commands.bump_retry(tx, envelope.command_id, &msg).await?;
                            Err(CommandBusError::HandlerRetryable(msg))
                        }
                        Err(HandlerError::Transient(msg)) => {
                            commands.bump_retry(tx, envelope.command_id, &msg).await?;
                            Err(CommandBusError::HandlerTransient(msg))
                        }
                    }
                })
            })
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_reply_and_event(
        tx: &mut messaging_core::TxScope<'_>,
        outbox: &Arc<O>,
        notifier: &OutboxNotifier,
        envelope: &CommandEnvelope,
        reply: &CommandReply,
        queue_naming: &QueueNaming,
        topic_naming: &TopicNaming,
    ) -> CommandBusResult<()> {
        let payload = serde_json::to_string(reply)?;
        let event_type = reply_event_type(reply.status);

        let reply_id = outbox
            .insert_returning_id(
                tx,
                "reply",
                &reply_topic(&envelope.reply_spec, queue_naming),
                Some(&envelope.command_id.to_string()),
                event_type,
                &payload,
                None,
            )
            .await?;

        let event_id = outbox
            .insert_returning_id(
                tx,
                "event",
                &completion_topic(&envelope.reply_spec, topic_naming),
                Some(&envelope.command_id.to_string()),
                event_type,
                &payload,
                None,
            )
            .await?;

        let notifier_reply = notifier.clone();
        let notifier_event = notifier.clone();
        tx.after_commit(move || notifier_reply.register(reply_id));
        tx.after_commit(move || notifier_event.register(event_id));

        Ok(())
    }
}
