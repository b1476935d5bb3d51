//! Data models for tasks and stage artifacts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a task
///
/// Transitions are monotonic along the sequence below; `Completed` and
/// `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Task created, waiting for a worker
    Queued,
    /// Transcription in progress
    Transcribing,
    /// Transcription complete, alignment not yet started
    Transcribed,
    /// Word alignment in progress
    Aligning,
    /// Speaker diarization in progress
    Diarizing,
    /// Summary generation in progress
    Summarizing,
    /// Pipeline finished, summary available
    Completed,
    /// Pipeline aborted; see the task error
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Transcribing => "transcribing",
            Self::Transcribed => "transcribed",
            Self::Aligning => "aligning",
            Self::Diarizing => "diarizing",
            Self::Summarizing => "summarizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "transcribing" => Some(Self::Transcribing),
            "transcribed" => Some(Self::Transcribed),
            "aligning" => Some(Self::Aligning),
            "diarizing" => Some(Self::Diarizing),
            "summarizing" => Some(Self::Summarizing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether no further transitions can occur.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The next status in the pipeline sequence, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Queued => Some(Self::Transcribing),
            Self::Transcribing => Some(Self::Transcribed),
            Self::Transcribed => Some(Self::Aligning),
            Self::Aligning => Some(Self::Diarizing),
            Self::Diarizing => Some(Self::Summarizing),
            Self::Summarizing => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    /// The stage executing while a task sits in this status.
    ///
    /// `Queued` and `Transcribed` are hand-off states with no running stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Transcribing => Some(Stage::Transcribe),
            Self::Aligning => Some(Stage::Align),
            Self::Diarizing => Some(Stage::Diarize),
            Self::Summarizing => Some(Stage::Summarize),
            _ => None,
        }
    }

    /// Deterministic progress percentage for pollers.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Transcribing => 10,
            Self::Transcribed => 25,
            Self::Aligning => 40,
            Self::Diarizing => 60,
            Self::Summarizing => 80,
            Self::Completed | Self::Failed => 100,
        }
    }
}

/// The closed set of pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Transcribe,
    Align,
    Diarize,
    Summarize,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 4] = [
        Stage::Transcribe,
        Stage::Align,
        Stage::Diarize,
        Stage::Summarize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Align => "align",
            Self::Diarize => "diarize",
            Self::Summarize => "summarize",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transcribe" => Some(Self::Transcribe),
            "align" => Some(Self::Align),
            "diarize" => Some(Self::Diarize),
            "summarize" => Some(Self::Summarize),
            _ => None,
        }
    }

    /// The status a task holds while this stage runs.
    pub fn running_status(&self) -> TaskStatus {
        match self {
            Self::Transcribe => TaskStatus::Transcribing,
            Self::Align => TaskStatus::Aligning,
            Self::Diarize => TaskStatus::Diarizing,
            Self::Summarize => TaskStatus::Summarizing,
        }
    }
}

/// Failure classification shared by stage runners, the orchestrator, and the
/// proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Momentary failure, worth retrying with backoff
    Transient,
    /// Unsupported or malformed input, never retried
    InputInvalid,
    /// Model server unreachable, retried a bounded number of times
    BackendUnavailable,
    /// Requested model unknown to the backend; operator-actionable
    ModelNotFound,
    /// Task was cancelled by an external signal
    Cancelled,
}

impl ErrorKind {
    /// Whether the orchestrator should retry a failure of this kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::BackendUnavailable)
    }
}

/// Terminal failure record, populated only on `Failed` tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    /// Status the task held when the failure occurred
    pub stage: TaskStatus,
    pub kind: ErrorKind,
    /// Raw cause, kept for diagnostics but never shown to pollers
    pub message: String,
}

impl TaskError {
    /// Short human-readable reason safe to surface to clients.
    pub fn public_reason(&self) -> String {
        match self.kind {
            ErrorKind::Transient => {
                format!("a temporary error occurred while {}", self.stage.as_str())
            }
            ErrorKind::InputInvalid => "the uploaded media could not be processed".to_string(),
            ErrorKind::BackendUnavailable => "the inference backend is unavailable".to_string(),
            ErrorKind::ModelNotFound => "the configured model is not available".to_string(),
            ErrorKind::Cancelled => "the task was cancelled".to_string(),
        }
    }
}

/// One transcribed span of speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds from the beginning of the media
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    pub text: String,
}

/// Transcribe stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Full transcript text, segment texts joined in order
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    /// Detected or configured language code
    pub language: Option<String>,
}

/// A word with its estimated time span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Align stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub words: Vec<AlignedWord>,
}

/// A transcript span attributed to one speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSegment {
    /// Speaker label, e.g. "SPEAKER_00"
    pub speaker: String,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Diarize stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diarization {
    pub segments: Vec<SpeakerSegment>,
}

/// Summarize stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    /// Model that produced the summary
    pub model: String,
}

/// Artifact produced by one successful stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageArtifact {
    Transcript(Transcript),
    Alignment(Alignment),
    Diarization(Diarization),
    Summary(Summary),
}

impl StageArtifact {
    /// The stage this artifact belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Transcript(_) => Stage::Transcribe,
            Self::Alignment(_) => Stage::Align,
            Self::Diarization(_) => Stage::Diarize,
            Self::Summary(_) => Stage::Summarize,
        }
    }
}

/// A media-to-summary job and its lifecycle record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (UUID), immutable
    pub id: String,

    /// Reference to the uploaded media; the pipeline never owns the bytes
    pub source_ref: String,

    /// Current lifecycle state
    pub status: TaskStatus,

    /// Append-only map of stage outputs, written exactly once per stage
    pub stage_outputs: BTreeMap<Stage, StageArtifact>,

    /// Populated only when `status` is `Failed`
    pub error: Option<TaskError>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last transition timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new queued task for the given media reference
    pub fn new(source_ref: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_ref,
            status: TaskStatus::Queued,
            stage_outputs: BTreeMap::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The completed summary, if the task has one.
    pub fn summary(&self) -> Option<&Summary> {
        match self.stage_outputs.get(&Stage::Summarize) {
            Some(StageArtifact::Summary(summary)) => Some(summary),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_sequence_reaches_completed() {
        let mut status = TaskStatus::Queued;
        let mut visited = vec![status];
        while let Some(next) = status.next() {
            status = next;
            visited.push(status);
        }
        assert_eq!(
            visited,
            vec![
                TaskStatus::Queued,
                TaskStatus::Transcribing,
                TaskStatus::Transcribed,
                TaskStatus::Aligning,
                TaskStatus::Diarizing,
                TaskStatus::Summarizing,
                TaskStatus::Completed,
            ]
        );
    }

    #[test]
    fn terminal_states_have_no_successor() {
        assert!(TaskStatus::Completed.next().is_none());
        assert!(TaskStatus::Failed.next().is_none());
    }

    #[test]
    fn work_states_map_to_stages_in_order() {
        let stages: Vec<Stage> = [
            TaskStatus::Transcribing,
            TaskStatus::Aligning,
            TaskStatus::Diarizing,
            TaskStatus::Summarizing,
        ]
        .iter()
        .filter_map(|s| s.stage())
        .collect();
        assert_eq!(stages, Stage::ALL);
    }

    #[test]
    fn progress_is_monotonic_along_the_sequence() {
        let mut status = TaskStatus::Queued;
        let mut last = status.progress_percent();
        while let Some(next) = status.next() {
            status = next;
            assert!(status.progress_percent() >= last);
            last = status.progress_percent();
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn status_roundtrips_through_strings() {
        for status in [
            TaskStatus::Queued,
            TaskStatus::Transcribing,
            TaskStatus::Transcribed,
            TaskStatus::Aligning,
            TaskStatus::Diarizing,
            TaskStatus::Summarizing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::BackendUnavailable.is_retryable());
        assert!(!ErrorKind::InputInvalid.is_retryable());
        assert!(!ErrorKind::ModelNotFound.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn public_reason_hides_internal_message() {
        let err = TaskError {
            stage: TaskStatus::Transcribing,
            kind: ErrorKind::InputInvalid,
            message: "hound: bad RIFF header at byte 3".to_string(),
        };
        assert!(!err.public_reason().contains("RIFF"));
    }
}
