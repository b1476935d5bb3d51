//! LLM access for the summarize stage
//!
//! Speaks the portable chat-completion protocol, so the summarize stage works
//! against the recap proxy or any compatible server unchanged.

mod client;
mod openai;
mod prompts;

pub use client::{build_provider, LlmProvider, SummaryRequest};
pub use openai::OpenAiClient;
pub use prompts::build_summary_prompt;
