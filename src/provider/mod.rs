//! Provider adapters for the supported LLM backends.
//!
//! Each adapter normalizes its wire protocol — OpenAI-style SSE, Ollama
//! NDJSON, or LM Studio's native JSON lines — into the canonical
//! [`StreamChunk`] stream. Whatever happens on the wire, one invocation
//! emits exactly one terminal `Done` (after an `Error` chunk if the round
//! failed), so callers are never left waiting.
//!
//! ## Structure
//!
//! - `types`: canonical chunk/message/tool-call model, abort plumbing
//! - `shared`: line framing and OpenAI-wire marshalling
//! - `openai`: OpenAI-compatible SSE adapter
//! - `ollama`: Ollama NDJSON adapter
//! - `lmstudio`: dual-mode LM Studio adapter

pub mod lmstudio;
pub mod ollama;
pub mod openai;
pub mod shared;
pub mod types;


use std::sync::Arc;

use crate::config::{ProviderKind, Settings};

pub use lmstudio::{LmStudioMode, LmStudioProvider};
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;
pub use types::{
    AbortHandle, AbortSignal, ChatRequest, ChunkSink, ContentPart, Message, MessageContent,
    ProviderError, Role, StreamChunk, ToolCall, ToolDefinition,
};

/// Capability interface every provider adapter implements.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Issue one streaming chat request. Spawns the stream task and returns
    /// its abort capability immediately; all output arrives through `sink`,
    /// ending in exactly one terminal `Done`.
    fn send_streaming(self: Arc<Self>, request: ChatRequest, sink: Arc<dyn ChunkSink>)
        -> AbortHandle;

    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}

/// Construct the adapter the settings select. Performed explicitly by the
/// host at startup; there is no global provider table.
pub fn for_settings(settings: &Settings) -> Arc<dyn Provider> {
    match settings.provider {
        ProviderKind::OpenAiCompat => Arc::new(OpenAiCompatProvider::new(
            settings.base_url.clone(),
            settings.api_key.clone(),
        )),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(settings.base_url.clone())),
        ProviderKind::LmStudio => {
            let mode = if settings.lmstudio_openai_compat {
                LmStudioMode::OpenAiCompat
            } else {
                LmStudioMode::Native
            };
            Arc::new(LmStudioProvider::new(settings.base_url.clone(), mode))
        }
    }
}
