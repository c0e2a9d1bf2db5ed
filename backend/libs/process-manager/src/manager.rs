//! `ProcessManager::start_process` / `handle_reply` (C10), implementing
//! spec.md §4.7: data-merge-with-override, the retry/backoff/
//! compensation branches, and the per-step idempotency key
//! `process_id + ":" + step_name`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use command_bus::{CommandBus, CommandRepository};
use messaging_core::{CommandReply, ProcessEvent, ProcessInstance, ProcessStatus, ReplyStatus, Store};
use outbox::OutboxRepository;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ProcessConfiguration;
use crate::error::{ProcessError, ProcessResult};
use crate::metrics::ProcessMetrics;
use crate::registry::ProcessRegistry;
use crate::repository::ProcessRepository;

fn retry_backoff(retries: i32, cap_ms: u64) -> Duration {
    let ms = 2u64.saturating_pow(retries.max(0) as u32).saturating_mul(1000);
    Duration::from_millis(ms.min(cap_ms))
}

fn step_idempotency_key(process_id: Uuid, step_name: &str) -> String {
    format!("{process_id}:{step_name}")
}

fn reply_spec_for(process_id: Uuid) -> serde_json::Value {
    serde_json::json!({
        "correlation_id": process_id.to_string(),
        "reply_topic": "process.replies",
        "completion_topic": "process.events",
    })
}

pub struct ProcessManager<PR, CR, OR>
where
    PR: ProcessRepository,
    CR: CommandRepository,
    OR: OutboxRepository,
{
    store: Store,
    repository: Arc<PR>,
    registry: Arc<ProcessRegistry>,
    command_bus: Arc<CommandBus<CR, OR>>,
    metrics: Option<ProcessMetrics>,
}

impl<PR, CR, OR> ProcessManager<PR, CR, OR>
where
    PR: ProcessRepository,
    CR: CommandRepository,
    OR: OutboxRepository,
{
    pub fn new(
        store: Store,
        repository: Arc<PR>,
        registry: Arc<ProcessRegistry>,
        command_bus: Arc<CommandBus<CR, OR>>,
    ) -> Self {
        Self {
            store,
            repository,
            registry,
            command_bus,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ProcessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn start_process(
        &self,
        process_type: &str,
        business_key: &str,
        initial_data: HashMap<String, serde_json::Value>,
    ) -> ProcessResult<Uuid> {
        let config = self.registry.get(process_type)?;
        let first = config
            .first_step()
            .expect("a registered process configuration always has at least one step");

        let process_id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let mut instance = ProcessInstance {
            process_id,
            process_type: process_type.to_string(),
            business_key: business_key.to_string(),
            status: ProcessStatus::New,
            current_step: Some(first.name.clone()),
            data: initial_data,
            retries: 0,
            created_at: now,
            updated_at: now,
        };

        self.persist(&instance, ProcessEvent::ProcessStarted, true).await?;
        if let Some(metrics) = &self.metrics {
            metrics.started.inc();
        }

        match self.issue_step(&instance, &first.name).await {
            Ok(()) => {
                instance.status = ProcessStatus::Running;
                self.persist(
                    &instance,
                    ProcessEvent::StepStarted {
                        step: first.name.clone(),
                    },
                    false,
                )
                .await?;
                info!(%process_id, process_type, step = %first.name, "process started");
                Ok(process_id)
            }
            Err(e) => {
                instance.status = ProcessStatus::Failed;
                let _ = self
                    .persist(
                        &instance,
                        ProcessEvent::ProcessFailed {
                            error: e.to_string(),
                        },
                        false,
                    )
                    .await;
                if let Some(metrics) = &self.metrics {
                    metrics.failed.inc();
                }
                Err(e)
            }
        }
    }

    pub async fn handle_reply(&self, process_id: Uuid, reply: CommandReply) {
        if let Err(e) = self.handle_reply_inner(process_id, reply).await {
            warn!(%process_id, error = %e, "handle_reply failed");
        }
    }

    async fn handle_reply_inner(&self, process_id: Uuid, reply: CommandReply) -> ProcessResult<()> {
        let mut instance = match self.load(process_id).await? {
            Some(instance) => instance,
            None => {
                warn!(%process_id, "reply for unknown process instance, ignoring");
                return Ok(());
            }
        };

        let config = self.registry.get(&instance.process_type)?;
        merge_data(&mut instance.data, &reply.data);

        let Some(current_step) = instance.current_step.clone() else {
            warn!(%process_id, "process instance has no current step, ignoring reply");
            return Ok(());
        };

        // A reply delivered while the instance is unwinding belongs to a
        // compensation command, not a forward step — route it to the
        // compensation cursor instead of the forward-graph handlers.
        if instance.status == ProcessStatus::Compensating {
            return self
                .on_compensation_reply(&config, instance, &current_step, reply)
                .await;
        }

        match reply.status {
            ReplyStatus::Completed => self.on_completed(&config, instance, &current_step).await,
            ReplyStatus::Failed => {
                let error = reply.error.unwrap_or_else(|| "unknown error".to_string());
                self.on_failed(&config, instance, &current_step, &error, true)
                    .await
            }
            ReplyStatus::TimedOut => {
                let error = reply
                    .error
                    .unwrap_or_else(|| "command timed out".to_string());
                self.on_failed(&config, instance, &current_step, &error, false)
                    .await
            }
        }
    }

    async fn on_completed(
        &self,
        config: &ProcessConfiguration,
        mut instance: ProcessInstance,
        current_step: &str,
    ) -> ProcessResult<()> {
        if config.is_last_step(current_step) {
            instance.status = ProcessStatus::Succeeded;
            self.persist(&instance, ProcessEvent::ProcessCompleted, false)
                .await?;
            if let Some(metrics) = &self.metrics {
                metrics.completed.inc();
            }
            info!(process_id = %instance.process_id, "process completed");
            return Ok(());
        }

        let next = config
            .next_step(current_step)
            .expect("non-last step always has a next step");
        let next_name = next.name.clone();
        instance.current_step = Some(next_name.clone());

        self.persist(
            &instance,
            ProcessEvent::StepCompleted {
                step: current_step.to_string(),
            },
            false,
        )
        .await?;

        match self.issue_step(&instance, &next_name).await {
            Ok(()) => {
                self.persist(
                    &instance,
                    ProcessEvent::StepStarted { step: next_name },
                    false,
                )
                .await
            }
            Err(e) => {
                instance.status = ProcessStatus::Failed;
                self.persist(
                    &instance,
                    ProcessEvent::ProcessFailed {
                        error: e.to_string(),
                    },
                    false,
                )
                .await?;
                if let Some(metrics) = &self.metrics {
                    metrics.failed.inc();
                }
                Err(e)
            }
        }
    }

    async fn on_failed(
        &self,
        config: &ProcessConfiguration,
        mut instance: ProcessInstance,
        current_step: &str,
        error: &str,
        retryable_eligible: bool,
    ) -> ProcessResult<()> {
        let step_config = config.step(current_step);
        let max_retries = step_config.map(|s| s.max_retries).unwrap_or(0);
        let is_retryable = retryable_eligible
            && step_config.is_some_and(|s| (s.is_retryable)(error))
            && instance.retries < max_retries;

        if is_retryable {
            instance.retries += 1;
            self.persist(
                &instance,
                ProcessEvent::StepFailed {
                    step: current_step.to_string(),
                    retry: true,
                    error: error.to_string(),
                },
                false,
            )
            .await?;

            tokio::time::sleep(retry_backoff(instance.retries, config.retry_backoff_cap_ms)).await;

            return match self.issue_step(&instance, current_step).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    instance.status = ProcessStatus::Failed;
                    self.persist(
                        &instance,
                        ProcessEvent::ProcessFailed {
                            error: e.to_string(),
                        },
                        false,
                    )
                    .await?;
                    if let Some(metrics) = &self.metrics {
                        metrics.failed.inc();
                    }
                    Err(e)
                }
            };
        }

        instance.status = ProcessStatus::Failed;
        self.persist(
            &instance,
            ProcessEvent::ProcessFailed {
                error: error.to_string(),
            },
            false,
        )
        .await?;
        if let Some(metrics) = &self.metrics {
            metrics.failed.inc();
        }

        if let Some(step_config) = step_config {
            if step_config.compensation.is_some() {
                return self.start_compensation(config, instance, current_step).await;
            }
        }

        Ok(())
    }

    async fn start_compensation(
        &self,
        config: &ProcessConfiguration,
        mut instance: ProcessInstance,
        failed_step: &str,
    ) -> ProcessResult<()> {
        instance.status = ProcessStatus::Compensating;
        self.persist(&instance, ProcessEvent::CompensationStarted, false)
            .await?;

        let first = match config.compensations_up_to(failed_step).into_iter().next() {
            Some(step) => step,
            None => {
                instance.status = ProcessStatus::Compensated;
                let result = self
                    .persist(&instance, ProcessEvent::CompensationCompleted, false)
                    .await;
                if result.is_ok() {
                    if let Some(metrics) = &self.metrics {
                        metrics.compensated.inc();
                    }
                }
                return result;
            }
        };

        instance.current_step = Some(first.name.clone());
        let compensation_name = first
            .compensation
            .clone()
            .expect("compensations_up_to only returns steps with a compensation");

        self.issue_compensation(&instance, &first.name, &compensation_name)
            .await?;
        self.persist(
            &instance,
            ProcessEvent::StepStarted {
                step: first.name.clone(),
            },
            false,
        )
        .await
    }

    /// Routes a reply for an in-flight compensation command: a
    /// `COMPLETED` reply advances the cursor to the next earlier step
    /// with a compensation (or finishes with `COMPENSATED` once none
    /// remain); a `FAILED`/`TIMED_OUT` reply has no defined recovery in
    /// spec.md, so it is logged and left `COMPENSATING` for operator
    /// intervention rather than silently abandoned.
    async fn on_compensation_reply(
        &self,
        config: &ProcessConfiguration,
        instance: ProcessInstance,
        current_step: &str,
        reply: CommandReply,
    ) -> ProcessResult<()> {
        match reply.status {
            ReplyStatus::Completed => {
                self.persist(
                    &instance,
                    ProcessEvent::StepCompleted {
                        step: current_step.to_string(),
                    },
                    false,
                )
                .await?;
                self.advance_compensation(config, instance, current_step).await
            }
            ReplyStatus::Failed | ReplyStatus::TimedOut => {
                let error = reply
                    .error
                    .unwrap_or_else(|| "compensation command failed".to_string());
                warn!(
                    process_id = %instance.process_id,
                    step = current_step,
                    error,
                    "compensation command failed; instance remains COMPENSATING"
                );
                self.persist(
                    &instance,
                    ProcessEvent::StepFailed {
                        step: current_step.to_string(),
                        retry: false,
                        error,
                    },
                    false,
                )
                .await
            }
        }
    }

    /// Advances the compensation cursor after `just_compensated_step`'s
    /// compensation command has completed.
    async fn advance_compensation(
        &self,
        config: &ProcessConfiguration,
        mut instance: ProcessInstance,
        just_compensated_step: &str,
    ) -> ProcessResult<()> {
        match config.next_compensation_before(just_compensated_step) {
            Some(next) => {
                instance.current_step = Some(next.name.clone());
                let compensation_name = next
                    .compensation
                    .clone()
                    .expect("next_compensation_before only returns steps with a compensation");
                self.issue_compensation(&instance, &next.name, &compensation_name)
                    .await?;
                self.persist(
                    &instance,
                    ProcessEvent::StepStarted {
                        step: next.name.clone(),
                    },
                    false,
                )
                .await
            }
            None => {
                instance.status = ProcessStatus::Compensated;
                let result = self
                    .persist(&instance, ProcessEvent::CompensationCompleted, false)
                    .await;
                if result.is_ok() {
                    if let Some(metrics) = &self.metrics {
                        metrics.compensated.inc();
                    }
                }
                result
            }
        }
    }

    async fn issue_compensation(
        &self,
        instance: &ProcessInstance,
        step_name: &str,
        compensation_command: &str,
    ) -> ProcessResult<()> {
        let idempotency_key = format!("{}:comp:{}", instance.process_id, step_name);
        let payload = serde_json::to_string(&instance.data)?;
        match self
            .command_bus
            .accept(
                compensation_command,
                &idempotency_key,
                &instance.business_key,
                &payload,
                reply_spec_for(instance.process_id),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(command_bus::CommandBusError::DuplicateIdempotencyKey(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn issue_step(&self, instance: &ProcessInstance, step_name: &str) -> ProcessResult<()> {
        let idempotency_key = step_idempotency_key(instance.process_id, step_name);
        let payload = serde_json::to_string(&instance.data)?;

        match self
            .command_bus
            .accept(
                step_name,
                &idempotency_key,
                &instance.business_key,
                &payload,
                reply_spec_for(instance.process_id),
            )
            .await
        {
            Ok(_) => Ok(()),
            // A second delivery of the same reply re-executes this
            // branch with the same idempotency key; the command already
            // in flight is the correct one to let finish.
            Err(command_bus::CommandBusError::DuplicateIdempotencyKey(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self, process_id: Uuid) -> ProcessResult<Option<ProcessInstance>> {
        let repository = Arc::clone(&self.repository);
        self.store
            .transaction(move |tx| {
                let repository = Arc::clone(&repository);
                Box::pin(async move { repository.load(tx, process_id).await })
            })
            .await
    }

    async fn persist(
        &self,
        instance: &ProcessInstance,
        event: ProcessEvent,
        is_new: bool,
    ) -> ProcessResult<()> {
        let repository = Arc::clone(&self.repository);
        let instance = instance.clone();

        self.store
            .transaction(move |tx| {
                let repository = Arc::clone(&repository);
                let instance = instance.clone();
                let event = event.clone();
                Box::pin(async move {
                    if is_new {
                        repository.insert_new(tx, &instance).await?;
                    } else {
                        repository.save(tx, &instance).await?;
                    }
                    repository.append_event(tx, instance.process_id, &event).await?;
                    Ok(())
                })
            })
            .await
    }
}

/// `data_new = reply.data ∪ data_existing`, reply values overriding on
/// key collision; keys only present in `existing` are kept untouched.
fn merge_data(
    existing: &mut HashMap<String, serde_json::Value>,
    reply_data: &HashMap<String, serde_json::Value>,
) {
    for (key, value) in reply_data {
        existing.insert(key.clone(), value.clone());
    }
}
