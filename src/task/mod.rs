//! Task lifecycle model and persistence
//!
//! A task is one submitted media-to-summary job. Everything that mutates a
//! task goes through [`TaskStore::update`]; no other component touches its
//! fields directly.

mod models;
mod store;

pub use models::{
    AlignedWord, Alignment, Diarization, ErrorKind, SpeakerSegment, Stage, StageArtifact, Summary,
    Task, TaskError, TaskStatus, Transcript, TranscriptSegment,
};
pub use store::{TaskMutation, TaskStore};
