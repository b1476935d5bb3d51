//! Inference proxy HTTP server

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Settings;
use crate::proxy::ollama::{
    NativeChatRequest, NativeChatStream, NativeOptions, OllamaClient, ProxyError,
};
use crate::proxy::wire::{
    completion_id, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ModelList,
    Usage, WireError,
};

/// Shared proxy state; holds no per-request or per-task data
#[derive(Clone)]
pub struct ProxyState {
    pub backend: Arc<OllamaClient>,
}

pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the proxy until interrupted.
pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let backend = OllamaClient::new(
        &settings.proxy.backend_url,
        Duration::from_secs(settings.proxy.timeout_secs),
    )?;
    let state = ProxyState {
        backend: Arc::new(backend),
    };

    let listener = tokio::net::TcpListener::bind(&settings.proxy.bind_addr).await?;
    info!(
        "Inference proxy listening on {} (backend {})",
        settings.proxy.bind_addr, settings.proxy.backend_url
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            ProxyError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::BackendUnavailable(_) | ProxyError::Backend(_) => StatusCode::BAD_GATEWAY,
        };
        let body = WireError::new(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

async fn list_models(State(state): State<ProxyState>) -> Result<Json<ModelList>, ProxyError> {
    let names = state.backend.list_models().await?;
    Ok(Json(ModelList::new(names)))
}

async fn health(State(state): State<ProxyState>) -> Response {
    match state.backend.list_models().await {
        Ok(names) => Json(json!({
            "status": "healthy",
            "backend": "connected",
            "models_count": names.len(),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::OK,
            Json(json!({
                "status": "degraded",
                "backend": { "status": "error", "message": e.to_string() },
            })),
        )
            .into_response(),
    }
}

async fn chat_completions(
    State(state): State<ProxyState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ProxyError> {
    if request.messages.is_empty() {
        return Err(ProxyError::InvalidRequest("messages must not be empty".to_string()));
    }

    if !state.backend.has_model(&request.model).await? {
        return Err(ProxyError::ModelNotFound(format!(
            "model '{}' is not available",
            request.model
        )));
    }

    let native = NativeChatRequest {
        model: request.model.clone(),
        messages: request.messages.clone(),
        stream: request.stream,
        options: NativeOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
    };

    if request.stream {
        let native_stream = state.backend.chat_stream(&native).await?;
        Ok(stream_response(native_stream, request.model).into_response())
    } else {
        let chunk = state.backend.chat(&native).await?;
        let content = chunk.message.map(|m| m.content).unwrap_or_default();
        let usage = Some(Usage {
            prompt_tokens: chunk.prompt_eval_count.unwrap_or(0),
            completion_tokens: chunk.eval_count.unwrap_or(0),
            total_tokens: chunk.prompt_eval_count.unwrap_or(0) + chunk.eval_count.unwrap_or(0),
        });
        Ok(Json(ChatCompletionResponse::new(&request.model, content, usage)).into_response())
    }
}

enum StreamPhase {
    /// Relaying backend chunks
    Body,
    /// Backend finished; emit the finish_reason frame
    Finish,
    /// Emit the single `[DONE]` marker
    Done,
    /// Stream exhausted
    Ended,
}

struct StreamState {
    native: NativeChatStream,
    id: String,
    model: String,
    phase: StreamPhase,
}

/// Bridge the native NDJSON stream onto SSE, one frame per backend chunk in
/// arrival order, then exactly one finish frame and one `[DONE]` marker.
///
/// Client disconnect drops this stream, which drops the backend response and
/// closes its connection; no backend work is orphaned.
fn stream_response(
    native: NativeChatStream,
    model: String,
) -> Sse<impl futures_util::Stream<Item = Result<Event, Infallible>>> {
    let state = StreamState {
        native,
        id: completion_id(),
        model,
        phase: StreamPhase::Body,
    };

    let events = stream::unfold(state, |mut st| async move {
        loop {
            match st.phase {
                StreamPhase::Body => match st.native.next_chunk().await {
                    Ok(Some(chunk)) => {
                        if chunk.done {
                            st.phase = StreamPhase::Finish;
                        }
                        let content = chunk.message.map(|m| m.content).unwrap_or_default();
                        if content.is_empty() {
                            // Nothing to relay (typically the bare done frame)
                            continue;
                        }
                        let frame = ChatCompletionChunk::content(&st.id, &st.model, content);
                        return Some((json_event(&frame), st));
                    }
                    Ok(None) => {
                        // Backend closed without a done flag; finish anyway
                        st.phase = StreamPhase::Finish;
                    }
                    Err(e) => {
                        error!("Backend stream failed: {}", e);
                        st.phase = StreamPhase::Done;
                        let body = WireError::new(e.code(), e.to_string());
                        return Some((json_event(&body), st));
                    }
                },
                StreamPhase::Finish => {
                    st.phase = StreamPhase::Done;
                    let frame = ChatCompletionChunk::finish(&st.id, &st.model);
                    return Some((json_event(&frame), st));
                }
                StreamPhase::Done => {
                    st.phase = StreamPhase::Ended;
                    return Some((Ok(Event::default().data("[DONE]")), st));
                }
                StreamPhase::Ended => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn json_event<T: serde::Serialize>(value: &T) -> Result<Event, Infallible> {
    match serde_json::to_string(value) {
        Ok(data) => Ok(Event::default().data(data)),
        Err(e) => {
            error!("Failed to serialize stream frame: {}", e);
            Ok(Event::default().data("{}"))
        }
    }
}
