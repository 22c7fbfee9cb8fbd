//! Streaming LLM orchestration engine for a local-first desktop assistant.
//!
//! This crate is the backend's conversation core: it drives streaming chat
//! rounds against a configurable provider (OpenAI-compatible, Ollama, or
//! LM Studio), runs the model's tool calls against a workspace-jailed tool
//! registry, and loops until the model answers in plain text. The host
//! application supplies settings, a chunk sink for its UI, and optionally a
//! confirmation collaborator for destructive file operations.
//!
//! # Architecture
//!
//! - `provider`: wire adapters normalizing each backend's stream into
//!   canonical chunks
//! - `orchestrator`: the multi-round tool-use loop with its call budget
//!   and cancellation routing
//! - `tools`: tool registry plus the built-in file and web-search tools
//! - `jail`: workspace path containment and gitignore-aware listing
//! - `config`: engine settings read from the host

pub mod config;
pub mod jail;
pub mod orchestrator;
pub mod provider;
pub mod tools;

pub use config::{ProviderKind, Settings, DEFAULT_MAX_TOOL_CALLS};
pub use jail::JailError;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use provider::{
    for_settings, AbortHandle, ChatRequest, ChunkSink, Message, Provider, ProviderError, Role,
    StreamChunk, ToolCall, ToolDefinition,
};
pub use tools::{Confirmer, Tool, ToolContext, ToolError, ToolRegistry};
