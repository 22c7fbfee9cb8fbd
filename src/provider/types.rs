//! Canonical stream model shared by every provider adapter.
//!
//! Adapters translate their wire protocol into [`StreamChunk`]s pushed
//! through a [`ChunkSink`]; the orchestrator and the host UI only ever see
//! this representation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Provider-agnostic stream event.
///
/// Every adapter invocation produces a finite sequence of chunks ending in
/// exactly one terminal event: `Done`, or `Error` followed by `Done`. No
/// chunk is ever emitted after the terminal `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Text { content: String },
    Thinking { content: String },
    ToolCall { tool_call: ToolCall },
    ToolResult { tool_call: ToolCall },
    Error { message: String },
    Done,
}

/// A tool invocation requested by the model.
///
/// Created when an adapter flushes a complete call; the orchestrator
/// attaches `result` exactly once after dispatch and never mutates the call
/// again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Byte offset into the round's accumulated text where this call was
    /// triggered, when the adapter can tell. Consumers may use it to
    /// interleave prose and tool cards; the orchestrator only preserves it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_offset: Option<usize>,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: None,
            content_offset: None,
        }
    }

    /// Locally assigned id for calls the wire protocol did not identify.
    pub fn local_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }
}

/// Immutable tool description echoed verbatim to every adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the tool arguments.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// One element of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Base64-encoded image payload with its media type (e.g. `image/png`).
    Image { media_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Provider-facing conversation message (distinct from whatever the host
/// application persists).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// `None` is only valid for an assistant message that issued nothing
    /// but tool calls.
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Correlates a `tool`-role message back to the call it answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    fn plain(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(text.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant turn carrying the round's accumulated text (possibly none)
    /// plus the structured tool-call list.
    pub fn assistant_tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.map(MessageContent::Text),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Flattened text content, with image parts dropped. `None` only for
    /// a tool-call-only assistant turn.
    pub fn text(&self) -> Option<String> {
        match &self.content {
            None => None,
            Some(MessageContent::Text(text)) => Some(text.clone()),
            Some(MessageContent::Parts(parts)) => Some(
                parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::Image { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        }
    }

    /// Tool-role result message, JSON-serialized and correlated by call id.
    pub fn tool_result(call_id: impl Into<String>, result: &serde_json::Value) -> Self {
        Self {
            role: Role::Tool,
            content: Some(MessageContent::Text(result.to_string())),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Everything an adapter needs to issue one streaming chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the provider for a reasoning trace where supported.
    #[serde(default)]
    pub reasoning: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            reasoning: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("auth error: {0}")]
    Auth(String),
}

/// Receives canonical chunks. The crate requires nothing about delivery;
/// the host UI transport, a channel, or a closure all qualify.
pub trait ChunkSink: Send + Sync {
    fn emit(&self, chunk: StreamChunk);
}

impl ChunkSink for tokio::sync::mpsc::UnboundedSender<StreamChunk> {
    fn emit(&self, chunk: StreamChunk) {
        // Receiver gone means the consumer stopped listening; dropping the
        // chunk is the correct behavior then.
        let _ = self.send(chunk);
    }
}

impl<F> ChunkSink for F
where
    F: Fn(StreamChunk) + Send + Sync,
{
    fn emit(&self, chunk: StreamChunk) {
        self(chunk)
    }
}

impl ChunkSink for Arc<dyn ChunkSink> {
    fn emit(&self, chunk: StreamChunk) {
        self.as_ref().emit(chunk)
    }
}

/// Capability to abort one in-flight streaming request.
///
/// Returned by `Provider::send_streaming`; the orchestrator keeps at most
/// one live handle per conversation channel so a UI cancel request can be
/// routed to the right round. Aborting is cooperative: the adapter stops
/// producing chunks and still terminates the stream with `Done`.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: tokio::sync::watch::Sender<bool>,
}

impl AbortHandle {
    pub fn new() -> (Self, AbortSignal) {
        let (tx, rx) = tokio::sync::watch::channel(false);
        (Self { tx }, AbortSignal { rx })
    }

    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Adapter-side half of an [`AbortHandle`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: tokio::sync::watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `abort()` is called. If every handle has been dropped
    /// without aborting, the request can no longer be cancelled and this
    /// future stays pending.
    pub async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod sink_tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_forwards_chunks() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.emit(StreamChunk::Text {
            content: "hi".into(),
        });
        tx.emit(StreamChunk::Done);
        assert_eq!(
            rx.recv().await,
            Some(StreamChunk::Text {
                content: "hi".into()
            })
        );
        assert_eq!(rx.recv().await, Some(StreamChunk::Done));
    }

    #[tokio::test]
    async fn abort_signal_observes_abort() {
        let (handle, mut signal) = AbortHandle::new();
        assert!(!signal.is_aborted());
        handle.abort();
        signal.aborted().await;
        assert!(signal.is_aborted());
    }

    #[test]
    fn chunk_serialization_is_tagged() {
        let chunk = StreamChunk::Text {
            content: "hello".into(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["content"], "hello");

        let done = serde_json::to_value(&StreamChunk::Done).unwrap();
        assert_eq!(done["type"], "done");
    }
}
