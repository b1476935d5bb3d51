//! Read-only status queries for pollers
//!
//! Performs no mutation and never synthesizes a status: everything here is a
//! straight read-through of the task store.

use serde::Serialize;
use std::sync::Arc;

use crate::task::{Task, TaskStatus, TaskStore};
use crate::{RecapError, Result};

/// Snapshot served to a polling client
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusReport {
    pub status: TaskStatus,
    /// 0-100, derived deterministically from the status
    pub progress: u8,
    /// Completed summary text, present only in `Completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Short human-readable failure reason, present only in `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read-only query surface over the task store
pub struct StatusService {
    store: Arc<TaskStore>,
}

impl StatusService {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    /// Current status snapshot for a task.
    pub fn status_of(&self, id: &str) -> Result<TaskStatusReport> {
        let task = self.store.get(id)?;
        Ok(report_for(&task))
    }

    /// The completed task for result rendering.
    ///
    /// `Conflict` while the task is still running or has failed.
    pub fn result_of(&self, id: &str) -> Result<Task> {
        let task = self.store.get(id)?;
        match task.status {
            TaskStatus::Completed => Ok(task),
            TaskStatus::Failed => Err(RecapError::Conflict(format!(
                "task {} failed: {}",
                id,
                task.error
                    .as_ref()
                    .map(|e| e.public_reason())
                    .unwrap_or_else(|| "unknown failure".to_string())
            ))),
            other => Err(RecapError::Conflict(format!(
                "task {} is still {}",
                id,
                other.as_str()
            ))),
        }
    }
}

fn report_for(task: &Task) -> TaskStatusReport {
    TaskStatusReport {
        status: task.status,
        progress: task.status.progress_percent(),
        result: task.summary().map(|s| s.text.clone()),
        error: task.error.as_ref().map(|e| e.public_reason()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ErrorKind, Stage, StageArtifact, Summary, TaskError, TaskMutation};

    fn completed_store() -> (Arc<TaskStore>, String) {
        let store = Arc::new(TaskStore::open_memory().unwrap());
        let task = store.create("clip.wav").unwrap();

        // Walk the machine to completion with placeholder artifacts
        use crate::task::{Alignment, Diarization, Transcript};
        store.update(&task.id, TaskMutation::Advance).unwrap();
        store
            .update(
                &task.id,
                TaskMutation::CompleteStage {
                    stage: Stage::Transcribe,
                    artifact: StageArtifact::Transcript(Transcript {
                        text: "hello".into(),
                        segments: vec![],
                        language: None,
                    }),
                },
            )
            .unwrap();
        store.update(&task.id, TaskMutation::Advance).unwrap();
        store
            .update(
                &task.id,
                TaskMutation::CompleteStage {
                    stage: Stage::Align,
                    artifact: StageArtifact::Alignment(Alignment { words: vec![] }),
                },
            )
            .unwrap();
        store
            .update(
                &task.id,
                TaskMutation::CompleteStage {
                    stage: Stage::Diarize,
                    artifact: StageArtifact::Diarization(Diarization { segments: vec![] }),
                },
            )
            .unwrap();
        store
            .update(
                &task.id,
                TaskMutation::CompleteStage {
                    stage: Stage::Summarize,
                    artifact: StageArtifact::Summary(Summary {
                        text: "Summary: hello".into(),
                        model: "test".into(),
                    }),
                },
            )
            .unwrap();

        let id = task.id;
        (store, id)
    }

    #[test]
    fn completed_task_reports_full_progress_and_result() {
        let (store, id) = completed_store();
        let service = StatusService::new(store);

        let report = service.status_of(&id).unwrap();
        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.progress, 100);
        assert_eq!(report.result.as_deref(), Some("Summary: hello"));
        assert!(report.error.is_none());

        let task = service.result_of(&id).unwrap();
        assert_eq!(task.summary().unwrap().text, "Summary: hello");
    }

    #[test]
    fn queued_task_has_zero_progress_and_no_result() {
        let store = Arc::new(TaskStore::open_memory().unwrap());
        let task = store.create("clip.wav").unwrap();
        let service = StatusService::new(store);

        let report = service.status_of(&task.id).unwrap();
        assert_eq!(report.status, TaskStatus::Queued);
        assert_eq!(report.progress, 0);
        assert!(report.result.is_none());

        let err = service.result_of(&task.id).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn failed_task_reports_public_reason_only() {
        let store = Arc::new(TaskStore::open_memory().unwrap());
        let task = store.create("clip.wav").unwrap();
        store
            .update(
                &task.id,
                TaskMutation::Fail(TaskError {
                    stage: TaskStatus::Queued,
                    kind: ErrorKind::InputInvalid,
                    message: "internal: hound parse failure".into(),
                }),
            )
            .unwrap();
        let service = StatusService::new(store);

        let report = service.status_of(&task.id).unwrap();
        assert_eq!(report.status, TaskStatus::Failed);
        let reason = report.error.unwrap();
        assert!(!reason.contains("hound"));
    }

    #[test]
    fn unknown_task_is_not_found() {
        let store = Arc::new(TaskStore::open_memory().unwrap());
        let service = StatusService::new(store);
        assert!(service.status_of("missing").unwrap_err().is_not_found());
    }
}
