//! Align stage: word-level timing estimation
//!
//! Whisper reports timestamps per segment. This stage distributes each
//! segment's time span across its words proportional to word length, which is
//! accurate enough for speaker attribution and subtitle-style display.

use async_trait::async_trait;

use crate::pipeline::{StageError, StageInput, StageRunner};
use crate::task::{AlignedWord, Alignment, Stage, StageArtifact, TranscriptSegment};

pub struct AlignRunner;

impl AlignRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AlignRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StageRunner for AlignRunner {
    fn stage(&self) -> Stage {
        Stage::Align
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let transcript = input.transcript()?;

        let mut words = Vec::new();
        for segment in &transcript.segments {
            words.extend(align_segment(segment));
        }

        tracing::debug!("Aligned {} words", words.len());
        Ok(StageArtifact::Alignment(Alignment { words }))
    }
}

/// Distribute a segment's time span across its words, weighted by length.
fn align_segment(segment: &TranscriptSegment) -> Vec<AlignedWord> {
    let tokens: Vec<&str> = segment.text.split_whitespace().collect();
    if tokens.is_empty() {
        return Vec::new();
    }

    let span = (segment.end - segment.start).max(0.0);
    let total_chars: usize = tokens.iter().map(|w| w.chars().count()).sum();

    let mut words = Vec::with_capacity(tokens.len());
    let mut cursor = segment.start;

    for token in &tokens {
        let weight = if total_chars == 0 {
            1.0 / tokens.len() as f64
        } else {
            token.chars().count() as f64 / total_chars as f64
        };
        let duration = span * weight;

        words.push(AlignedWord {
            word: (*token).to_string(),
            start: cursor,
            end: cursor + duration,
        });
        cursor += duration;
    }

    // Pin the last word to the segment boundary to absorb rounding drift
    if let Some(last) = words.last_mut() {
        last.end = segment.end;
    }

    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::task::{Transcript, TranscriptSegment};

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn words_cover_the_segment_span_in_order() {
        let words = align_segment(&segment(10.0, 14.0, "hello brave new world"));
        assert_eq!(words.len(), 4);
        assert_eq!(words[0].word, "hello");
        assert!((words[0].start - 10.0).abs() < 1e-9);
        assert!((words.last().unwrap().end - 14.0).abs() < 1e-9);
        for pair in words.windows(2) {
            assert!(pair[0].end <= pair[1].start + 1e-9);
        }
    }

    #[test]
    fn longer_words_get_longer_spans() {
        let words = align_segment(&segment(0.0, 10.0, "a extraordinarily"));
        assert!(words[1].end - words[1].start > words[0].end - words[0].start);
    }

    #[test]
    fn empty_segment_text_yields_no_words() {
        assert!(align_segment(&segment(0.0, 1.0, "   ")).is_empty());
    }

    #[tokio::test]
    async fn runner_requires_a_transcript() {
        let outputs = BTreeMap::new();
        let input = StageInput {
            source_ref: "clip.wav",
            outputs: &outputs,
        };
        let err = AlignRunner::new().run(&input).await.unwrap_err();
        assert_eq!(err.kind, crate::task::ErrorKind::InputInvalid);
    }

    #[tokio::test]
    async fn runner_aligns_all_segments() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            Stage::Transcribe,
            StageArtifact::Transcript(Transcript {
                text: "hello world again".to_string(),
                segments: vec![segment(0.0, 2.0, "hello world"), segment(2.5, 3.5, "again")],
                language: None,
            }),
        );
        let input = StageInput {
            source_ref: "clip.wav",
            outputs: &outputs,
        };

        let artifact = AlignRunner::new().run(&input).await.unwrap();
        match artifact {
            StageArtifact::Alignment(alignment) => assert_eq!(alignment.words.len(), 3),
            other => panic!("unexpected artifact: {:?}", other),
        }
    }
}
