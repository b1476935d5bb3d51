//! Task state machine execution

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Settings;
use crate::pipeline::cancel::CancelHandle;
use crate::pipeline::stage::{StageError, StageInput, StageRunner};
use crate::task::{Stage, StageArtifact, Task, TaskError, TaskMutation, TaskStatus, TaskStore};
use crate::{RecapError, Result};

/// Bounded retry schedule for retryable stage failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per stage, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.pipeline.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.pipeline.retry_backoff_ms),
        }
    }

    /// Backoff before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Runner registry, one per stage identity
pub type StageRunners = HashMap<Stage, Arc<dyn StageRunner>>;

/// Advances tasks through the ordered stage sequence
///
/// The orchestrator is the only component that interprets stage outcomes; it
/// writes every transition through the task store and never mutates a task
/// directly.
pub struct PipelineOrchestrator {
    store: Arc<TaskStore>,
    runners: StageRunners,
    retry: RetryPolicy,
}

impl PipelineOrchestrator {
    pub fn new(store: Arc<TaskStore>, runners: StageRunners, retry: RetryPolicy) -> Self {
        Self {
            store,
            runners,
            retry,
        }
    }

    /// Drive one task until it reaches a terminal state.
    ///
    /// Safe to re-invoke after a crash: stages whose artifact already exists
    /// are skipped, not re-executed. The caller (dispatcher) guarantees no
    /// concurrent execution for the same task id.
    pub async fn run_task(&self, id: &str, cancel: &CancelHandle) -> Result<TaskStatus> {
        loop {
            let task = self.store.get(id)?;

            if task.status.is_terminal() {
                return Ok(task.status);
            }

            if cancel.is_cancelled() {
                self.fail_task(&task, StageError::cancelled())?;
                continue;
            }

            let Some(stage) = task.status.stage() else {
                // Queued / Transcribed hand-off states just move forward
                self.store.update(id, TaskMutation::Advance)?;
                continue;
            };

            if task.stage_outputs.contains_key(&stage) {
                // Resumed past a stage that already succeeded
                info!("Task {}: {} artifact present, skipping", id, stage.as_str());
                self.store.update(id, TaskMutation::Advance)?;
                continue;
            }

            let runner = self.runners.get(&stage).ok_or_else(|| {
                RecapError::Pipeline(format!("no runner registered for {}", stage.as_str()))
            })?;

            // Racing the stage against the cancel signal drops its future,
            // which closes any backend connection it holds (the proxy path
            // for the summarize stage).
            let outcome = tokio::select! {
                res = self.run_with_retry(runner.as_ref(), &task, stage) => res,
                _ = cancel.cancelled() => Err(StageError::cancelled()),
            };

            match outcome {
                Ok(artifact) => {
                    info!("Task {}: {} completed", id, stage.as_str());
                    self.store
                        .update(id, TaskMutation::CompleteStage { stage, artifact })?;
                }
                Err(error) => {
                    warn!(
                        "Task {}: {} failed ({:?}): {}",
                        id,
                        stage.as_str(),
                        error.kind,
                        error.message
                    );
                    self.fail_task(&task, error)?;
                }
            }
        }
    }

    fn fail_task(&self, task: &Task, error: StageError) -> Result<()> {
        self.store.update(
            &task.id,
            TaskMutation::Fail(TaskError {
                stage: task.status,
                kind: error.kind,
                message: error.message,
            }),
        )?;
        Ok(())
    }

    async fn run_with_retry(
        &self,
        runner: &dyn StageRunner,
        task: &Task,
        stage: Stage,
    ) -> std::result::Result<StageArtifact, StageError> {
        let input = StageInput::from_task(task);
        let mut attempt = 1;

        loop {
            match runner.run(&input).await {
                Ok(artifact) => return Ok(artifact),
                Err(error) if error.kind.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Task {}: {} attempt {}/{} failed ({}), retrying in {:?}",
                        task.id,
                        stage.as_str(),
                        attempt,
                        self.retry.max_attempts,
                        error.message,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
