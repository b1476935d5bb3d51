//! Native Ollama backend client
//!
//! Speaks Ollama's `/api/chat` and `/api/tags`; streaming responses arrive
//! as newline-delimited JSON.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::proxy::wire::ChatMessage;

/// Proxy-side error taxonomy, mapped to wire codes at the HTTP boundary
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProxyError {
    /// Stable machine-readable code for the wire error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelNotFound(_) => "model_not_found",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Backend(_) => "backend_error",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::BackendUnavailable(e.to_string())
        } else {
            Self::Backend(e.to_string())
        }
    }
}

/// Native chat request shape
#[derive(Debug, Clone, Serialize)]
pub struct NativeChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: NativeOptions,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NativeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NativeMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// One native response object; streaming emits a sequence of these with
/// `done: true` on the last.
#[derive(Debug, Clone, Deserialize)]
pub struct NativeChatChunk {
    #[serde(default)]
    pub message: Option<NativeMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    #[serde(default)]
    pub eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// HTTP client for the native model server
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build backend HTTP client: {}", e))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// List model names known to the backend.
    pub async fn list_models(&self) -> Result<Vec<String>, ProxyError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(ProxyError::from_reqwest)?;

        let response = response
            .error_for_status()
            .map_err(|e| ProxyError::Backend(e.to_string()))?;

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProxyError::Backend(format!("bad tags response: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the backend knows the model, matching with or without a tag
    /// suffix ("mistral" matches "mistral:latest").
    pub async fn has_model(&self, model: &str) -> Result<bool, ProxyError> {
        let names = self.list_models().await?;
        Ok(names.iter().any(|name| {
            name == model || name.split(':').next() == Some(model)
        }))
    }

    /// Issue a non-streaming chat request.
    pub async fn chat(&self, request: &NativeChatRequest) -> Result<NativeChatChunk, ProxyError> {
        let response = self.send_chat(request).await?;
        response
            .json()
            .await
            .map_err(|e| ProxyError::Backend(format!("bad chat response: {}", e)))
    }

    /// Issue a streaming chat request; chunks arrive in backend emission
    /// order. Dropping the stream closes the backend connection.
    pub async fn chat_stream(
        &self,
        request: &NativeChatRequest,
    ) -> Result<NativeChatStream, ProxyError> {
        let response = self.send_chat(request).await?;
        Ok(NativeChatStream {
            response,
            buffer: Vec::new(),
            finished: false,
        })
    }

    async fn send_chat(&self, request: &NativeChatRequest) -> Result<reqwest::Response, ProxyError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(ProxyError::from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(ProxyError::ModelNotFound(format!(
                "model '{}' not known to backend",
                request.model
            )))
        } else if status.is_server_error() {
            Err(ProxyError::BackendUnavailable(format!(
                "backend returned {}: {}",
                status, body
            )))
        } else {
            Err(ProxyError::Backend(format!(
                "backend returned {}: {}",
                status, body
            )))
        }
    }
}

/// Incremental NDJSON reader over a streaming chat response
pub struct NativeChatStream {
    response: reqwest::Response,
    buffer: Vec<u8>,
    finished: bool,
}

impl NativeChatStream {
    /// Next parsed chunk, or `None` once the backend closes the stream.
    pub async fn next_chunk(&mut self) -> Result<Option<NativeChatChunk>, ProxyError> {
        loop {
            if self.finished && self.buffer.is_empty() {
                return Ok(None);
            }

            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                if let Some(chunk) = parse_line(&line)? {
                    return Ok(Some(chunk));
                }
                continue;
            }

            if self.finished {
                // Trailing data without a newline
                let line = std::mem::take(&mut self.buffer);
                return parse_line(&line);
            }

            match self
                .response
                .chunk()
                .await
                .map_err(|e| ProxyError::BackendUnavailable(e.to_string()))?
            {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => self.finished = true,
            }
        }
    }
}

fn parse_line(line: &[u8]) -> Result<Option<NativeChatChunk>, ProxyError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| ProxyError::Backend(format!("non-utf8 stream data: {}", e)))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| ProxyError::Backend(format!("bad stream chunk '{}': {}", text, e)))
}
