//! Diarize stage: speaker attribution
//!
//! A full diarization model is out of reach without GPU-backed embeddings, so
//! this stage uses the turn-taking structure of the transcript: a silence gap
//! of at least `speaker_gap_secs` starts a new speaker, cycling through a
//! bounded label set. Adjacent segments from the same speaker are merged.

use async_trait::async_trait;

use crate::config::Settings;
use crate::pipeline::{StageError, StageInput, StageRunner};
use crate::task::{Diarization, SpeakerSegment, Stage, StageArtifact, TranscriptSegment};

pub struct DiarizeRunner {
    /// Silence gap in seconds that signals a speaker change
    speaker_gap_secs: f64,
    /// Number of distinct speaker labels to cycle through
    max_speakers: usize,
}

impl DiarizeRunner {
    pub fn new(speaker_gap_secs: f64, max_speakers: usize) -> Self {
        Self {
            speaker_gap_secs,
            max_speakers: max_speakers.max(1),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.pipeline.speaker_gap_secs,
            settings.pipeline.max_speakers,
        )
    }

    fn assign_speakers(&self, segments: &[TranscriptSegment]) -> Vec<SpeakerSegment> {
        let mut result: Vec<SpeakerSegment> = Vec::new();
        let mut speaker_idx = 0usize;
        let mut prev_end: Option<f64> = None;

        for segment in segments {
            if let Some(prev_end) = prev_end {
                if segment.start - prev_end >= self.speaker_gap_secs {
                    speaker_idx = (speaker_idx + 1) % self.max_speakers;
                }
            }
            prev_end = Some(segment.end);

            let speaker = speaker_label(speaker_idx);

            // Merge with the previous turn if the speaker did not change
            if let Some(last) = result.last_mut() {
                if last.speaker == speaker {
                    last.end = segment.end;
                    last.text.push(' ');
                    last.text.push_str(&segment.text);
                    continue;
                }
            }

            result.push(SpeakerSegment {
                speaker,
                start: segment.start,
                end: segment.end,
                text: segment.text.clone(),
            });
        }

        result
    }
}

fn speaker_label(idx: usize) -> String {
    format!("SPEAKER_{:02}", idx)
}

#[async_trait]
impl StageRunner for DiarizeRunner {
    fn stage(&self) -> Stage {
        Stage::Diarize
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let transcript = input.transcript()?;

        let segments = self.assign_speakers(&transcript.segments);
        tracing::debug!("Diarization produced {} speaker turns", segments.len());

        Ok(StageArtifact::Diarization(Diarization { segments }))
    }
}
