use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::Settings;
use crate::llm::client::{LlmProvider, SummaryRequest};
use crate::llm::prompts::build_summary_prompt;
use crate::pipeline::StageError;
use crate::proxy::wire::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, WireError};

/// Client for any OpenAI-compatible chat-completions endpoint, typically the
/// recap inference proxy.
pub struct OpenAiClient {
    http: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let endpoint = settings.llm.endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            anyhow::bail!("llm.endpoint is empty. Point it at the recap proxy or a compatible server.");
        }

        let model = settings.llm.model.trim().to_string();
        if model.is_empty() {
            anyhow::bail!("llm.model is empty");
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.llm.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build LLM HTTP client: {}", e))?;

        Ok(Self {
            http,
            endpoint,
            model,
            temperature: settings.llm.temperature,
            max_tokens: if settings.llm.max_tokens == 0 {
                None
            } else {
                Some(settings.llm.max_tokens)
            },
        })
    }

    fn request_url(&self) -> String {
        format!("{}/v1/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn summarize(&self, request: SummaryRequest<'_>) -> Result<String, StageError> {
        let prompt = build_summary_prompt(request.source_ref, request.conversation);

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system("You write concise, factual summaries of transcribed audio."),
                ChatMessage::user(prompt),
            ],
            stream: false,
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(self.request_url())
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error_response(status, &body));
        }

        let payload: ChatCompletionResponse = response.json().await.map_err(|e| {
            StageError::transient(format!("Failed to parse chat-completion response: {}", e))
        })?;

        let summary = payload
            .content()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StageError::transient("chat-completion response had no content"))?;

        Ok(summary)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn classify_transport_error(e: reqwest::Error) -> StageError {
    if e.is_connect() || e.is_timeout() {
        StageError::backend_unavailable(format!("chat-completion request failed: {}", e))
    } else {
        StageError::transient(format!("chat-completion request failed: {}", e))
    }
}

/// Map a non-2xx response to the stage error taxonomy, honoring the wire
/// error code when present.
fn classify_error_response(status: StatusCode, body: &str) -> StageError {
    if let Ok(wire) = serde_json::from_str::<WireError>(body) {
        let message = format!("{} ({})", wire.error.message, wire.error.code);
        return match wire.error.code.as_str() {
            "model_not_found" => StageError::model_not_found(message),
            "backend_unavailable" => StageError::backend_unavailable(message),
            "invalid_request" => StageError::input_invalid(message),
            _ => StageError::transient(message),
        };
    }

    let message = format!("chat-completion endpoint returned {}: {}", status, body);
    match status {
        StatusCode::NOT_FOUND => StageError::model_not_found(message),
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            StageError::backend_unavailable(message)
        }
        s if s.is_client_error() => StageError::input_invalid(message),
        _ => StageError::transient(message),
    }
}
