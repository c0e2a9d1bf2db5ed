//! Pure-data process graph: an ordered list of steps, each naming the
//! command to issue and, optionally, the command that undoes it.
//!
//! This replaces a reflective process DSL (a fluent builder evaluated at
//! run time via annotations/reflection) with a plain data structure
//! assembled once via [`ProcessConfiguration::builder`] and never
//! inspected through anything but its own accessors.

use std::sync::Arc;

/// Default cap on the retry backoff sleep (spec.md §4.7/§5: "bounded by
/// a configured cap"), used unless a configuration overrides it via
/// [`ProcessConfigBuilder::with_retry_backoff_cap`].
pub const DEFAULT_RETRY_BACKOFF_CAP_MS: u64 = 60_000;

/// A predicate deciding whether a step's failure is worth retrying.
pub type RetryPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub struct StepConfig {
    pub name: String,
    pub compensation: Option<String>,
    pub is_retryable: RetryPredicate,
    pub max_retries: i32,
}

impl StepConfig {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compensation: None,
            is_retryable: Arc::new(|_err: &str| true),
            max_retries: 3,
        }
    }
}

pub struct ProcessConfiguration {
    pub process_type: String,
    pub steps: Vec<StepConfig>,
    /// Cap, in milliseconds, on the `2^retries` retry backoff sleep
    /// between a `StepFailed(retry=true)` and re-issuing the same step.
    pub retry_backoff_cap_ms: u64,
}

impl ProcessConfiguration {
    pub fn builder(process_type: impl Into<String>) -> ProcessConfigBuilder {
        ProcessConfigBuilder {
            process_type: process_type.into(),
            steps: Vec::new(),
            retry_backoff_cap_ms: DEFAULT_RETRY_BACKOFF_CAP_MS,
        }
    }

    pub fn first_step(&self) -> Option<&StepConfig> {
        self.steps.first()
    }

    pub fn step(&self, name: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn is_last_step(&self, name: &str) -> bool {
        self.steps.last().is_some_and(|s| s.name == name)
    }

    pub fn next_step(&self, name: &str) -> Option<&StepConfig> {
        let idx = self.steps.iter().position(|s| s.name == name)?;
        self.steps.get(idx + 1)
    }

    /// Completed steps with a declared compensation, in reverse
    /// (most-recently-completed-first) order, strictly before
    /// `failed_step` — the step that failed never completed, so it has
    /// nothing to compensate.
    pub fn compensations_up_to<'a>(&'a self, failed_step: &str) -> Vec<&'a StepConfig> {
        let idx = match self.steps.iter().position(|s| s.name == failed_step) {
            Some(idx) => idx,
            None => return Vec::new(),
        };
        self.steps[..idx]
            .iter()
            .rev()
            .filter(|s| s.compensation.is_some())
            .collect()
    }

    /// The next earlier step (strictly before `step_name` in forward
    /// order) that declares a compensation, walking the compensation
    /// cursor backward one link at a time.
    pub fn next_compensation_before(&self, step_name: &str) -> Option<&StepConfig> {
        let idx = self.steps.iter().position(|s| s.name == step_name)?;
        self.steps[..idx].iter().rev().find(|s| s.compensation.is_some())
    }
}

pub struct ProcessConfigBuilder {
    process_type: String,
    steps: Vec<StepConfig>,
    retry_backoff_cap_ms: u64,
}

impl ProcessConfigBuilder {
    /// Overrides the retry backoff cap (default [`DEFAULT_RETRY_BACKOFF_CAP_MS`]).
    pub fn with_retry_backoff_cap(mut self, cap_ms: u64) -> Self {
        self.retry_backoff_cap_ms = cap_ms;
        self
    }

    pub fn start_with(mut self, step: impl Into<String>) -> Self {
        self.steps.push(StepConfig::new(step));
        self
    }

    pub fn then(mut self, step: impl Into<String>) -> Self {
        self.steps.push(StepConfig::new(step));
        self
    }

    /// Attaches a compensation command to the most recently added step.
    pub fn with_compensation(mut self, command: impl Into<String>) -> Self {
        if let Some(last) = self.steps.last_mut() {
            last.compensation = Some(command.into());
        }
        self
    }

    /// Overrides the retry predicate and cap for the most recently added
    /// step. Defaults are "always retryable" and 3 attempts.
    pub fn with_retry(mut self, predicate: RetryPredicate, max_retries: i32) -> Self {
        if let Some(last) = self.steps.last_mut() {
            last.is_retryable = predicate;
            last.max_retries = max_retries;
        }
        self
    }

    pub fn end(self) -> ProcessConfiguration {
        ProcessConfiguration {
            process_type: self.process_type,
            steps: self.steps,
            retry_backoff_cap_ms: self.retry_backoff_cap_ms,
        }
    }
}
