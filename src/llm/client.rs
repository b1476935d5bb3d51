use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Settings;
use crate::llm::openai::OpenAiClient;
use crate::pipeline::StageError;

/// Summary generation request payload.
pub struct SummaryRequest<'a> {
    pub source_ref: &'a str,
    /// Speaker-attributed conversation text
    pub conversation: &'a str,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produce a summary, classifying transport failures into the stage
    /// error taxonomy so the orchestrator can decide retry vs. escalate.
    async fn summarize(&self, request: SummaryRequest<'_>) -> Result<String, StageError>;

    /// Model identifier sent to the backend.
    fn model(&self) -> &str;
}

/// Build an LLM provider from runtime settings.
pub fn build_provider(settings: &Settings) -> anyhow::Result<Arc<dyn LlmProvider>> {
    match settings.llm.provider.to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::from_settings(settings)?)),
        other => anyhow::bail!(
            "Unsupported llm.provider '{}'. Supported providers: openai",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn unsupported_provider_returns_error() {
        let mut settings = Settings::default();
        settings.llm.provider = "unknown".to_string();

        let err = match build_provider(&settings) {
            Ok(_) => panic!("expected provider creation to fail"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("Unsupported llm.provider"));
    }

    #[test]
    fn default_provider_builds() {
        let settings = Settings::default();
        let provider = build_provider(&settings).expect("openai provider should build");
        assert_eq!(provider.model(), "mistral");
    }
}
