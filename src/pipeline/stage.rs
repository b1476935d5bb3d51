//! Stage runner contract
//!
//! Runners know nothing about the task store or the state machine; they take
//! the accumulated prior artifacts and either produce the next artifact or
//! fail with a classified cause. The orchestrator alone decides what a
//! failure means.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::task::{
    Alignment, Diarization, ErrorKind, Stage, StageArtifact, Task, Transcript,
};

/// Classified failure reported by a stage runner
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn input_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputInvalid, message)
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendUnavailable, message)
    }

    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelNotFound, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled by external signal")
    }
}

/// Input handed to a stage runner: the media reference plus every artifact
/// produced so far.
pub struct StageInput<'a> {
    pub source_ref: &'a str,
    pub outputs: &'a BTreeMap<Stage, StageArtifact>,
}

impl<'a> StageInput<'a> {
    pub fn from_task(task: &'a Task) -> Self {
        Self {
            source_ref: &task.source_ref,
            outputs: &task.stage_outputs,
        }
    }

    /// The transcript produced by the transcribe stage.
    pub fn transcript(&self) -> Result<&'a Transcript, StageError> {
        match self.outputs.get(&Stage::Transcribe) {
            Some(StageArtifact::Transcript(t)) => Ok(t),
            _ => Err(StageError::input_invalid("missing transcript artifact")),
        }
    }

    /// The word alignment produced by the align stage.
    pub fn alignment(&self) -> Result<&'a Alignment, StageError> {
        match self.outputs.get(&Stage::Align) {
            Some(StageArtifact::Alignment(a)) => Ok(a),
            _ => Err(StageError::input_invalid("missing alignment artifact")),
        }
    }

    /// The speaker segments produced by the diarize stage.
    pub fn diarization(&self) -> Result<&'a Diarization, StageError> {
        match self.outputs.get(&Stage::Diarize) {
            Some(StageArtifact::Diarization(d)) => Ok(d),
            _ => Err(StageError::input_invalid("missing diarization artifact")),
        }
    }
}

/// One unit of pipeline work
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// The stage identity this runner implements.
    fn stage(&self) -> Stage;

    /// Produce this stage's artifact from the prior ones, or fail with a
    /// typed cause.
    async fn run(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError>;
}
