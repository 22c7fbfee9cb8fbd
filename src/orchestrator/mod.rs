//! Multi-round tool-use orchestration.
//!
//! Drives a conversation through repeated rounds: send the history through
//! the active provider adapter, collect the canonical chunks it streams
//! back, execute any tool calls, append the results to the history, loop.
//! One round is one provider call; the loop is bounded by a cumulative
//! tool-call budget so a model that keeps calling tools cannot spin
//! forever.
//!
//! Chunks are forwarded to the caller's sink as they arrive, except that
//! intermediate round terminations are swallowed: across a whole
//! orchestration the sink sees exactly one final `Done`, so a UI never
//! hangs waiting for completion.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::provider::types::{AbortHandle, ChatRequest, ChunkSink, Message, StreamChunk, ToolCall};
use crate::provider::Provider;
use crate::tools::{ToolContext, ToolRegistry};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("provider stream failed: {0}")]
    Provider(String),
    #[error("maximum tool calls exceeded (limit {0})")]
    ToolBudgetExceeded(usize),
}

/// Owns the tool registry and the per-channel abort handles. One instance
/// serves every conversation channel; the only cross-channel state is the
/// channel→handle map, keyed uniquely per conversation.
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    handles: DashMap<String, AbortHandle>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            handles: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Route a UI cancel request to the channel's in-flight round. The
    /// adapter answers with its terminal chunk, which ends the round
    /// through the normal path; there is no special cancellation state.
    pub fn cancel(&self, channel: &str) -> bool {
        match self.handles.get(channel) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Run one orchestration to completion and return the final message
    /// history. `request.tools` is populated from the currently enabled
    /// tools; chunks stream to `sink` throughout.
    pub async fn run(
        &self,
        channel: &str,
        provider: Arc<dyn Provider>,
        mut request: ChatRequest,
        ctx: &ToolContext,
        sink: Arc<dyn ChunkSink>,
    ) -> Result<Vec<Message>, OrchestratorError> {
        let enabled = self.registry.enabled_names(&ctx.settings);
        request.tools = self.registry.definitions(&ctx.settings);

        let budget = ctx.settings.max_tool_calls;
        let mut executed: usize = 0;
        let mut round: usize = 0;

        loop {
            round += 1;
            tracing::debug!(channel, round, provider = provider.name(), "starting round");

            // Explicit per-round completion channel: the adapter streams
            // into it and guarantees a terminal chunk.
            let (tx, mut rx) = mpsc::unbounded_channel::<StreamChunk>();
            let handle = provider.clone().send_streaming(request.clone(), Arc::new(tx));
            // The previous round has fully terminated by now; replacing the
            // handle here keeps at most one live handle per channel.
            self.handles.insert(channel.to_string(), handle);

            let mut text = String::new();
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut round_error: Option<String> = None;

            while let Some(chunk) = rx.recv().await {
                match chunk {
                    StreamChunk::Text { content } => {
                        text.push_str(&content);
                        sink.emit(StreamChunk::Text { content });
                    }
                    StreamChunk::Thinking { content } => {
                        sink.emit(StreamChunk::Thinking { content });
                    }
                    StreamChunk::ToolCall { tool_call } => {
                        calls.push(tool_call.clone());
                        sink.emit(StreamChunk::ToolCall { tool_call });
                    }
                    StreamChunk::ToolResult { tool_call } => {
                        sink.emit(StreamChunk::ToolResult { tool_call });
                    }
                    StreamChunk::Error { message } => {
                        round_error = Some(message.clone());
                        sink.emit(StreamChunk::Error { message });
                    }
                    StreamChunk::Done => break,
                }
            }

            if let Some(message) = round_error {
                // No partial tool execution for a failed round.
                self.handles.remove(channel);
                sink.emit(StreamChunk::Done);
                return Err(OrchestratorError::Provider(message));
            }

            if calls.is_empty() {
                self.handles.remove(channel);
                sink.emit(StreamChunk::Done);
                if !text.is_empty() {
                    request.messages.push(Message::assistant(text));
                }
                return Ok(request.messages);
            }

            // Cumulative budget, checked before executing the round's
            // calls so the limit is never exceeded.
            if executed + calls.len() > budget {
                tracing::warn!(channel, executed, requested = calls.len(), budget, "tool budget exhausted");
                self.handles.remove(channel);
                sink.emit(StreamChunk::Error {
                    message: format!(
                        "maximum tool calls exceeded (limit {budget}); stopping to avoid a loop"
                    ),
                });
                sink.emit(StreamChunk::Done);
                return Err(OrchestratorError::ToolBudgetExceeded(budget));
            }

            // Sequential execution: result order always matches collection
            // order, and history stays deterministic.
            for call in &mut calls {
                executed += 1;
                let result = if enabled.contains(&call.name) {
                    self.registry.dispatch(&call.name, &call.arguments, ctx).await
                } else {
                    // Disabled or unknown; never reaches an executor but
                    // still counts toward the budget.
                    serde_json::json!({
                        "error": format!("tool not available: {}", call.name),
                        "code": "PERMISSION_DENIED",
                    })
                };
                call.result = Some(result);
                sink.emit(StreamChunk::ToolResult {
                    tool_call: call.clone(),
                });
            }

            let round_text = if text.is_empty() { None } else { Some(text) };
            request
                .messages
                .push(Message::assistant_tool_calls(round_text, calls.clone()));
            for call in &calls {
                let result = call.result.clone().unwrap_or(serde_json::Value::Null);
                request
                    .messages
                    .push(Message::tool_result(call.id.clone(), &result));
            }
        }
    }
}
