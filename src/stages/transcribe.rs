//! Transcribe stage: WAV decode + whisper-rs inference

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::Settings;
use crate::pipeline::{StageError, StageInput, StageRunner};
use crate::task::{Stage, StageArtifact, Transcript, TranscriptSegment};

/// Whisper expects 16 kHz mono input
const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Whisper-backed transcribe runner
pub struct TranscribeRunner {
    ctx: Arc<WhisperContext>,
    language: Option<String>,
    translate: bool,
}

impl TranscribeRunner {
    /// Load the whisper model configured in settings.
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let model_path = settings.model_path();

        if !model_path.exists() {
            anyhow::bail!(
                "Whisper model not found at {}. Download a ggml model for '{}' first.",
                model_path.display(),
                settings.whisper.model
            );
        }

        let path_str = model_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Model path is not valid UTF-8"))?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| anyhow::anyhow!("Failed to load Whisper model: {}", e))?;

        let language = if settings.whisper.language.is_empty() {
            None
        } else {
            Some(settings.whisper.language.clone())
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            language,
            translate: settings.whisper.translate,
        })
    }

    fn transcribe_samples(
        ctx: &WhisperContext,
        samples: &[f32],
        language: Option<&str>,
        translate: bool,
    ) -> Result<Vec<TranscriptSegment>, StageError> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_translate(translate);

        if let Some(lang) = language {
            params.set_language(Some(lang));
        }

        let mut state = ctx
            .create_state()
            .map_err(|e| StageError::transient(format!("Failed to create Whisper state: {}", e)))?;
        state
            .full(params, samples)
            .map_err(|e| StageError::transient(format!("Whisper inference failed: {}", e)))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| StageError::transient(format!("Failed to get segment count: {}", e)))?;

        let mut segments = Vec::new();
        for i in 0..num_segments {
            let start = state
                .full_get_segment_t0(i)
                .map_err(|e| StageError::transient(format!("Failed to get segment start: {}", e)))?
                as f64
                / 100.0; // centiseconds
            let end = state
                .full_get_segment_t1(i)
                .map_err(|e| StageError::transient(format!("Failed to get segment end: {}", e)))?
                as f64
                / 100.0;
            let text = state
                .full_get_segment_text(i)
                .map_err(|e| StageError::transient(format!("Failed to get segment text: {}", e)))?;

            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }

            segments.push(TranscriptSegment { start, end, text });
        }

        Ok(segments)
    }
}

#[async_trait]
impl StageRunner for TranscribeRunner {
    fn stage(&self) -> Stage {
        Stage::Transcribe
    }

    async fn run(&self, input: &StageInput<'_>) -> Result<StageArtifact, StageError> {
        let path = Path::new(input.source_ref);
        tracing::info!("Loading audio from {}", path.display());

        let samples = load_audio(path)?;
        if samples.is_empty() {
            return Err(StageError::input_invalid("audio file contains no samples"));
        }

        let ctx = self.ctx.clone();
        let language = self.language.clone();
        let translate = self.translate;

        // Whisper inference is compute-bound; keep it off the async workers
        let segments = tokio::task::spawn_blocking(move || {
            Self::transcribe_samples(&ctx, &samples, language.as_deref(), translate)
        })
        .await
        .map_err(|e| StageError::transient(format!("transcription task panicked: {}", e)))??;

        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        tracing::info!("Transcription complete: {} segments", segments.len());

        Ok(StageArtifact::Transcript(Transcript {
            text,
            segments,
            language: self.language.clone(),
        }))
    }
}

/// Load a WAV file as f32 samples at 16 kHz mono.
fn load_audio(path: &Path) -> Result<Vec<f32>, StageError> {
    let reader = hound::WavReader::open(path).map_err(|e| {
        StageError::input_invalid(format!("Failed to open audio file {}: {}", path.display(), e))
    })?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    tracing::debug!(
        "Loading audio: {} Hz, {} channels, {:?}",
        sample_rate,
        channels,
        spec.sample_format
    );

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .filter_map(|s| s.ok())
            .map(|s| s as f32 / 32768.0)
            .collect(),
        (hound::SampleFormat::Int, 32) => reader
            .into_samples::<i32>()
            .filter_map(|s| s.ok())
            .map(|s| s as f32 / 2147483648.0)
            .collect(),
        (hound::SampleFormat::Float, 32) => {
            reader.into_samples::<f32>().filter_map(|s| s.ok()).collect()
        }
        _ => {
            return Err(StageError::input_invalid(format!(
                "Unsupported audio format: {:?} {}bit",
                spec.sample_format, spec.bits_per_sample
            )))
        }
    };

    // Mix down to mono
    let samples = if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    let samples = if sample_rate != WHISPER_SAMPLE_RATE {
        resample(&samples, sample_rate, WHISPER_SAMPLE_RATE)
    } else {
        samples
    };

    Ok(samples)
}

/// Simple linear resampling
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f64;

        let sample = if src_idx + 1 < samples.len() {
            samples[src_idx] * (1.0 - frac as f32) + samples[src_idx + 1] * frac as f32
        } else if src_idx < samples.len() {
            samples[src_idx]
        } else {
            0.0
        };

        result.push(sample);
    }

    result
}
