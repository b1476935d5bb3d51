//! CLI command implementations
//!
//! `serve` and `proxy` run the long-lived services; everything else is a thin
//! HTTP client against a running task API.

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::cli::args::ConfigCommand;
use crate::config::Settings;

/// Run the task API server until interrupted.
pub async fn serve(settings: &Settings) -> Result<()> {
    crate::server::run(settings).await
}

/// Run the inference proxy until interrupted.
pub async fn proxy(settings: &Settings) -> Result<()> {
    crate::proxy::run(settings).await
}

/// Submit a recording to a running server.
pub async fn submit(settings: &Settings, source: &str) -> Result<()> {
    let api = ApiClient::new(settings)?;

    let response = api
        .http
        .post(api.url("/api/task"))
        .json(&serde_json::json!({ "source_ref": source }))
        .send()
        .await
        .context("Failed to reach the recap server. Is `recap serve` running?")?;

    let accepted: SubmittedTask = read_json(response).await?;
    println!("Task accepted: {}", accepted.id);
    println!("Poll with: recap status {}", accepted.id);

    Ok(())
}

/// Show the status of a task.
pub async fn status(settings: &Settings, id: &str) -> Result<()> {
    let api = ApiClient::new(settings)?;

    let response = api
        .http
        .get(api.url(&format!("/api/task/{}/status", id)))
        .send()
        .await
        .context("Failed to reach the recap server. Is `recap serve` running?")?;

    let report: StatusReport = read_json(response).await?;
    println!("Status: {} ({}%)", report.status, report.progress);
    if let Some(error) = report.error {
        println!("Error: {}", error);
    }
    if report.result.is_some() {
        println!("Fetch the summary with: recap result {}", id);
    }

    Ok(())
}

/// Fetch the summary of a completed task.
pub async fn result(settings: &Settings, id: &str, format: &str) -> Result<()> {
    let api = ApiClient::new(settings)?;

    let response = api
        .http
        .get(api.url(&format!("/api/task/{}/result", id)))
        .query(&[("format", format)])
        .send()
        .await
        .context("Failed to reach the recap server. Is `recap serve` running?")?;

    let body = read_text(response).await?;
    println!("{}", body);

    Ok(())
}

/// Request cancellation of a running task.
pub async fn cancel(settings: &Settings, id: &str) -> Result<()> {
    let api = ApiClient::new(settings)?;

    let response = api
        .http
        .post(api.url(&format!("/api/task/{}/cancel", id)))
        .send()
        .await
        .context("Failed to reach the recap server. Is `recap serve` running?")?;

    let _: serde_json::Value = read_json(response).await?;
    println!("Cancellation requested for {}", id);

    Ok(())
}

/// Handle config subcommands
pub fn config_command(settings: &Settings, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let toml = toml::to_string_pretty(settings)?;
            println!("{}", toml);
        }
        ConfigCommand::Path => {
            let path = Settings::config_path()?;
            println!("{}", path.display());
        }
        ConfigCommand::Init { force } => {
            let path = Settings::config_path()?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Settings::write_default(&path)?;
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    fn new(settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base: format!("http://{}", settings.server.bind_addr),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

#[derive(Deserialize)]
struct SubmittedTask {
    id: String,
}

#[derive(Deserialize)]
struct StatusReport {
    status: String,
    progress: u8,
    result: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: String,
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!(error_message(status, &response.text().await.unwrap_or_default()));
    }
    response
        .json::<T>()
        .await
        .context("Failed to parse server response")
}

async fn read_text(response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!(error_message(status, &body));
    }
    Ok(body)
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(api) => api.error,
        Err(_) => format!("Server returned {}: {}", status, body),
    }
}
