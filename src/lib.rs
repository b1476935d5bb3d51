//! recap - turn recorded audio into a text summary through a staged pipeline
//!
//! The crate hosts two services: the task pipeline (transcribe -> align ->
//! diarize -> summarize, observable via polling) and an OpenAI-compatible
//! inference proxy that fronts a local Ollama server.

pub mod cli;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod proxy;
pub mod server;
pub mod stages;
pub mod status;
pub mod task;

use thiserror::Error;

/// Main error type for recap
#[derive(Error, Debug)]
pub enum RecapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl RecapError {
    /// Whether this error means the referenced task does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error is a rejected mutation (terminal task, bad transition).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, RecapError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "recap";
