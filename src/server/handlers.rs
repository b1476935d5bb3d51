use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::server::AppState;
use crate::status::TaskStatusReport;
use crate::task::Task;
use crate::{RecapError, Result};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Reference to the recording to process (path or URL)
    pub source_ref: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: String,
    pub status: String,
}

pub async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Response> {
    let source_ref = request.source_ref.trim();
    if source_ref.is_empty() {
        return Err(RecapError::Config("source_ref must not be empty".to_string()));
    }

    let task = state.dispatcher.submit(source_ref).await?;
    info!("Accepted task {} for {}", task.id, source_ref);

    let body = SubmitResponse {
        id: task.id,
        status: task.status.as_str().to_string(),
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

pub async fn task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusReport>> {
    Ok(Json(state.status.status_of(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "text".to_string()
}

pub async fn task_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ResultQuery>,
) -> Result<Response> {
    let task = state.status.result_of(&id)?;

    match query.format.as_str() {
        "text" => Ok(plain_text(render_text(&task))),
        "markdown" => Ok(plain_text(render_markdown(&task))),
        other => Err(RecapError::Config(format!(
            "Unsupported format '{}'. Supported formats: text, markdown",
            other
        ))),
    }
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    state.dispatcher.cancel(&id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "status": "cancelling" })),
    )
        .into_response())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "version": crate::VERSION }))
}

fn plain_text(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

fn render_text(task: &Task) -> String {
    task.summary().map(|s| s.text.clone()).unwrap_or_default()
}

fn render_markdown(task: &Task) -> String {
    let mut doc = format!("# Summary of {}\n\n", task.source_ref);

    if let Some(summary) = task.summary() {
        doc.push_str(&summary.text);
        doc.push_str("\n\n");
        doc.push_str(&format!("---\n*Generated by {} ({})*\n", crate::APP_NAME, summary.model));
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{StageArtifact, Summary, TaskStatus};
    use std::collections::BTreeMap;

    fn completed_task() -> Task {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            crate::task::Stage::Summarize,
            StageArtifact::Summary(Summary {
                text: "Summary: hello world".into(),
                model: "mistral".into(),
            }),
        );
        let mut task = Task::new("clip.wav".to_string());
        task.status = TaskStatus::Completed;
        task.stage_outputs = outputs;
        task
    }

    #[test]
    fn text_render_is_bare_summary() {
        assert_eq!(render_text(&completed_task()), "Summary: hello world");
    }

    #[test]
    fn markdown_render_has_heading_and_attribution() {
        let doc = render_markdown(&completed_task());
        assert!(doc.starts_with("# Summary of clip.wav"));
        assert!(doc.contains("Summary: hello world"));
        assert!(doc.contains("mistral"));
    }
}
