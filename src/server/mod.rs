//! Task API HTTP server
//!
//! Thin HTTP surface over the dispatcher and status service. All task
//! semantics live below this layer; handlers translate between HTTP and the
//! crate error types and nothing else.

mod handlers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Settings;
use crate::pipeline::{Dispatcher, PipelineOrchestrator, RetryPolicy, StageRunners};
use crate::status::StatusService;
use crate::task::TaskStore;
use crate::RecapError;

/// Shared state for the task API
#[derive(Clone)]
pub struct AppState {
    pub status: Arc<StatusService>,
    pub dispatcher: Arc<Dispatcher>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/task", post(handlers::submit_task))
        .route("/api/task/:id/status", get(handlers::task_status))
        .route("/api/task/:id/result", get(handlers::task_result))
        .route("/api/task/:id/cancel", post(handlers::cancel_task))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Assemble the pipeline around an open store and serve until interrupted.
///
/// Unfinished tasks from a previous run are re-enqueued before the listener
/// accepts traffic.
pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_dirs()?;

    let store = Arc::new(TaskStore::open(settings)?);
    let runners = crate::stages::production_runners(settings)?;
    let (state, dispatcher) = build_app(settings, store, runners);

    let recovered = dispatcher.recover().await?;
    if recovered > 0 {
        info!("Recovered {} unfinished task(s)", recovered);
    }

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr).await?;
    info!("Task API listening on {}", settings.server.bind_addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

/// Wire the store, orchestrator and dispatcher into serveable state.
///
/// Split out from [`run`] so tests can drive the full app in-process with
/// their own runners.
pub fn build_app(
    settings: &Settings,
    store: Arc<TaskStore>,
    runners: StageRunners,
) -> (AppState, Arc<Dispatcher>) {
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        store.clone(),
        runners,
        RetryPolicy::from_settings(settings),
    ));
    let dispatcher = Dispatcher::start(store.clone(), orchestrator, settings.pipeline.workers);

    let state = AppState {
        status: Arc::new(StatusService::new(store)),
        dispatcher: dispatcher.clone(),
    };
    (state, dispatcher)
}

impl IntoResponse for RecapError {
    fn into_response(self) -> Response {
        let status = match &self {
            RecapError::NotFound(_) => StatusCode::NOT_FOUND,
            RecapError::Conflict(_) => StatusCode::CONFLICT,
            RecapError::Config(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Request failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
