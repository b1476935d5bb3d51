//! Summarize stage: LLM summary over the diarized transcript
//!
//! Sole consumer of the inference proxy. The provider classifies its own
//! transport failures, so this runner only shapes input and output.

use async_trait::async_trait;
use std::sync::Arc;

use crate::llm::{LlmProvider, SummaryRequest};
use crate::pipeline::{StageError, StageInput, StageRunner};
use crate::task::{Diarization, Stage, StageArtifact, Summary};

pub struct SummarizeRunner {
    provider: Arc<dyn LlmProvider>,
}

impl SummarizeRunner {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl StageRunner for SummarizeRunner {
    fn stage(&self) -> Stage {
        Stage::Summarize
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let diarization = input.diarization()?;

        let conversation = render_conversation(diarization);
        if conversation.is_empty() {
            return Err(StageError::input_invalid(
                "transcript is empty, nothing to summarize",
            ));
        }

        let text = self
            .provider
            .summarize(SummaryRequest {
                source_ref: input.source_ref,
                conversation: &conversation,
            })
            .await?;

        Ok(StageArtifact::Summary(Summary {
            text,
            model: self.provider.model().to_string(),
        }))
    }
}

/// Render speaker turns as "SPEAKER_XX: text" lines.
fn render_conversation(diarization: &Diarization) -> String {
    diarization
        .segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| format!("{}: {}", s.speaker, s.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
