//! Configuration management for recap

mod settings;

pub use settings::{
    GeneralSettings, LlmSettings, PipelineSettings, ProxySettings, ServerSettings, Settings,
    WhisperSettings,
};
