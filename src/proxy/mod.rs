//! Inference proxy
//!
//! Accepts OpenAI-style chat-completion requests and forwards them to a
//! local Ollama server's native protocol, relaying streamed output in
//! arrival order. Stateless and concurrently reentrant; usable by the
//! summarize stage and by external callers alike.

mod ollama;
mod server;
pub mod wire;

pub use ollama::{NativeChatChunk, NativeChatStream, OllamaClient, ProxyError};
pub use server::{build_router, run, ProxyState};
