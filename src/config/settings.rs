//! Application settings management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// General settings
    #[serde(default)]
    pub general: GeneralSettings,

    /// Task API server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Pipeline scheduling and retry settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Whisper transcription settings
    #[serde(default)]
    pub whisper: WhisperSettings,

    /// LLM settings for the summarize stage
    #[serde(default)]
    pub llm: LlmSettings,

    /// Inference proxy settings
    #[serde(default)]
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Data directory for the task database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address for the task API
    #[serde(default = "default_server_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Number of concurrent pipeline workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum attempts per stage for retryable failures
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Silence gap in seconds that starts a new speaker turn
    #[serde(default = "default_speaker_gap")]
    pub speaker_gap_secs: f64,

    /// Upper bound on distinct speaker labels
    #[serde(default = "default_max_speakers")]
    pub max_speakers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperSettings {
    /// Whisper model to use (tiny, base, small, medium, large)
    #[serde(default = "default_model")]
    pub model: String,

    /// Path to model files directory
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Language for transcription (empty = auto-detect)
    #[serde(default)]
    pub language: String,

    /// Enable translation to English
    #[serde(default)]
    pub translate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider for the summarize stage (openai = any chat-completions server)
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat-completions endpoint, typically the recap proxy
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Model name passed through to the backend
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate (0 = backend default)
    #[serde(default)]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Bind address for the inference proxy
    #[serde(default = "default_proxy_addr")]
    pub bind_addr: String,

    /// Native model server base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Backend request timeout in seconds (also caps idle streams)
    #[serde(default = "default_proxy_timeout")]
    pub timeout_secs: u64,
}

// Default value functions

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "recap", "recap")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.local/share/recap"))
}

fn default_models_dir() -> PathBuf {
    let mut dir = default_data_dir();
    dir.push("models");
    dir
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_addr() -> String {
    "127.0.0.1:8751".to_string()
}

fn default_proxy_addr() -> String {
    "127.0.0.1:8752".to_string()
}

fn default_backend_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_speaker_gap() -> f64 {
    1.5
}

fn default_max_speakers() -> usize {
    4
}

fn default_model() -> String {
    "base".to_string()
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_endpoint() -> String {
    "http://127.0.0.1:8752".to_string()
}

fn default_llm_model() -> String {
    "mistral".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_proxy_timeout() -> u64 {
    300
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_server_addr(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            speaker_gap_secs: default_speaker_gap(),
            max_speakers: default_max_speakers(),
        }
    }
}

impl Default for WhisperSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            models_dir: default_models_dir(),
            language: String::new(),
            translate: false,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: 0,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            bind_addr: default_proxy_addr(),
            backend_url: default_backend_url(),
            timeout_secs: default_proxy_timeout(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            server: ServerSettings::default(),
            pipeline: PipelineSettings::default(),
            whisper: WhisperSettings::default(),
            llm: LlmSettings::default(),
            proxy: ProxySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("No config file found, using defaults");
            let mut settings = Self::default();
            settings.apply_env_overrides();
            return Ok(settings);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        settings.apply_env_overrides();

        Ok(settings)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("RECAP_LLM_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.llm.endpoint = endpoint;
            }
        }
        if let Ok(backend) = std::env::var("RECAP_PROXY_BACKEND") {
            if !backend.trim().is_empty() {
                self.proxy.backend_url = backend;
            }
        }
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "recap", "recap").context("Could not determine config directory")?;

        let config_dir = dirs.config_dir();
        Ok(config_dir.join("config.toml"))
    }

    /// Write default configuration to a file
    pub fn write_default(path: &PathBuf) -> Result<()> {
        let settings = Self::default();
        let content = toml::to_string_pretty(&settings)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the task database path
    pub fn database_path(&self) -> PathBuf {
        self.general.data_dir.join("recap.db")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.general.data_dir)?;
        std::fs::create_dir_all(&self.whisper.models_dir)?;
        Ok(())
    }

    /// Get the path to a whisper model file
    pub fn model_path(&self) -> PathBuf {
        self.whisper
            .models_dir
            .join(format!("ggml-{}.bin", self.whisper.model))
    }
}
