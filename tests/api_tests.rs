mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use common::{happy_runners, SlowRunner};
use recap::config::Settings;
use recap::pipeline::{StageRunner, StageRunners};
use recap::server::{build_app, build_router};
use recap::task::{Stage, TaskStore};

fn test_app(runners: StageRunners) -> Router {
    let settings = Settings::default();
    let store = Arc::new(TaskStore::open_memory().expect("open store"));
    let (state, _dispatcher) = build_app(&settings, store, runners);
    build_router(state)
}

async fn request_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("app response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn request_text(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.expect("app response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    (status, String::from_utf8(bytes.to_vec()).expect("utf8 body"))
}

fn submit_request(source_ref: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/task")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "source_ref": source_ref }).to_string()))
        .expect("build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("build request")
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

async fn submit(app: &Router, source_ref: &str) -> String {
    let (status, body) = request_json(app, submit_request(source_ref)).await;
    assert_eq!(status, StatusCode::ACCEPTED, "submit failed: {}", body);
    body["id"].as_str().expect("task id").to_string()
}

/// Poll until the task reaches the wanted status, failing after a deadline.
async fn wait_for_status(app: &Router, id: &str, wanted: &str) -> Value {
    for _ in 0..100 {
        let (status, body) = request_json(app, get(&format!("/api/task/{}/status", id))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == wanted {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {} never reached {}", id, wanted);
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_poll_and_fetch_result() {
    let app = test_app(happy_runners());

    let id = submit(&app, "meeting.wav").await;
    let report = wait_for_status(&app, &id, "completed").await;
    assert_eq!(report["progress"], 100);
    assert_eq!(report["result"], "Summary: hello world");

    let (status, body) = request_text(&app, get(&format!("/api/task/{}/result", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Summary: hello world");

    let (status, body) =
        request_text(&app, get(&format!("/api/task/{}/result?format=markdown", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("# Summary of meeting.wav"));
    assert!(body.contains("Summary: hello world"));
}

#[tokio::test(flavor = "multi_thread")]
async fn result_conflicts_while_task_is_running() {
    let mut runners = happy_runners();
    runners.insert(
        Stage::Transcribe,
        Arc::new(SlowRunner::new(Stage::Transcribe, Duration::from_secs(30)))
            as Arc<dyn StageRunner>,
    );
    let app = test_app(runners);

    let id = submit(&app, "meeting.wav").await;

    let (status, _) = request_text(&app, get(&format!("/api/task/{}/result", id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_settles_a_running_task_as_failed() {
    let mut runners = happy_runners();
    runners.insert(
        Stage::Transcribe,
        Arc::new(SlowRunner::new(Stage::Transcribe, Duration::from_secs(30)))
            as Arc<dyn StageRunner>,
    );
    let app = test_app(runners);

    let id = submit(&app, "meeting.wav").await;
    wait_for_status(&app, &id, "transcribing").await;

    let (status, body) = request_json(&app, post(&format!("/api/task/{}/cancel", id))).await;
    assert_eq!(status, StatusCode::ACCEPTED, "cancel failed: {}", body);

    let report = wait_for_status(&app, &id, "failed").await;
    assert_eq!(report["error"], "the task was cancelled");

    // A second cancel hits a terminal task
    let (status, _) = request_json(&app, post(&format!("/api/task/{}/cancel", id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_task_ids_return_not_found() {
    let app = test_app(happy_runners());

    let (status, _) = request_json(&app, get("/api/task/nope/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request_text(&app, get("/api/task/nope/result")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request_json(&app, post("/api/task/nope/cancel")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_source_ref_is_rejected() {
    let app = test_app(happy_runners());

    let (status, _) = request_json(&app, submit_request("  ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_result_format_is_rejected() {
    let app = test_app(happy_runners());

    let id = submit(&app, "meeting.wav").await;
    wait_for_status(&app, &id, "completed").await;

    let (status, _) =
        request_text(&app, get(&format!("/api/task/{}/result?format=pdf", id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread")]
async fn health_endpoint_reports_version() {
    let app = test_app(happy_runners());

    let (status, body) = request_json(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}
