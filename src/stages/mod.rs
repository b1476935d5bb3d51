//! Production stage adapters
//!
//! Each adapter implements [`StageRunner`](crate::pipeline::StageRunner) for
//! one stage of the pipeline. The orchestrator only ever sees the runner
//! contract; everything backend-specific lives here.

mod align;
mod diarize;
mod summarize;
mod transcribe;

pub use align::AlignRunner;
pub use diarize::DiarizeRunner;
pub use summarize::SummarizeRunner;
pub use transcribe::TranscribeRunner;

use anyhow::Result;
use std::sync::Arc;

use crate::config::Settings;
use crate::llm;
use crate::pipeline::{StageRunner, StageRunners};
use crate::task::Stage;

/// Build the full production runner set from settings.
///
/// Fails fast on configuration problems (missing whisper model, unsupported
/// LLM provider) so `serve` refuses to start rather than failing every task.
pub fn production_runners(settings: &Settings) -> Result<StageRunners> {
    let provider = llm::build_provider(settings)?;

    let mut runners = StageRunners::new();
    runners.insert(
        Stage::Transcribe,
        Arc::new(TranscribeRunner::new(settings)?) as Arc<dyn StageRunner>,
    );
    runners.insert(Stage::Align, Arc::new(AlignRunner::new()));
    runners.insert(Stage::Diarize, Arc::new(DiarizeRunner::from_settings(settings)));
    runners.insert(Stage::Summarize, Arc::new(SummarizeRunner::new(provider)));
    Ok(runners)
}
