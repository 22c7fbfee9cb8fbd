//! OpenAI-compatible provider adapter (SSE framing).
//!
//! The response body is a Server-Sent-Events stream of `data: <json>` lines
//! terminated by a literal `data: [DONE]`. Content deltas stream straight
//! through as `text` chunks. Tool-call deltas arrive fragmented: each delta
//! carries an `index`, only the first delta for an index carries the call id
//! and function name, and later deltas append to the partial JSON argument
//! string. Accumulated calls are flushed — once, the pending map is drained —
//! on `finish_reason == "tool_calls"` or at stream end.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::provider::shared::{
    describe_transport_error, wire_messages, wire_tools, LineBuffer, WireMessage, WireTool,
};
use crate::provider::types::{
    AbortHandle, AbortSignal, ChatRequest, ChunkSink, ProviderError, StreamChunk, ToolCall,
};
use crate::provider::Provider;

pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    provider_name: &'static str,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_name(base_url, api_key, "openai-compat")
    }

    /// Same adapter under a different label, for providers that delegate
    /// here (LM Studio in OpenAI-compatible mode).
    pub(crate) fn with_name(
        base_url: impl Into<String>,
        api_key: Option<String>,
        provider_name: &'static str,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client: reqwest::Client::new(),
            provider_name,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    async fn stream_round(
        &self,
        request: ChatRequest,
        sink: &Arc<dyn ChunkSink>,
        signal: &mut AbortSignal,
    ) -> Result<(), String> {
        let body = ChatBody {
            model: request.model.clone(),
            messages: wire_messages(&request.messages),
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: wire_tools(&request.tools),
            tool_choice: if request.tools.is_empty() {
                None
            } else {
                Some("auto")
            },
        };

        let endpoint = self.endpoint("chat/completions");
        tracing::debug!(provider = self.provider_name, %endpoint, model = %request.model, "sending streaming chat request");

        let response = self
            .authorized(self.client.post(&endpoint))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| describe_transport_error(&e, &self.base_url))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(format!(
                "{} auth failed ({status}). Check API key and account access.",
                self.provider_name
            ));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("{} error {status}: {text}", self.provider_name));
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut state = SseState::new();

        loop {
            let chunk = tokio::select! {
                _ = signal.aborted() => {
                    tracing::debug!(provider = self.provider_name, "stream aborted by caller");
                    return Ok(());
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return Err(format!("stream read failed: {e}")),
            };
            for line in lines.push(&bytes) {
                if process_sse_line(&line, &mut state, sink.as_ref()) {
                    state.flush(sink.as_ref());
                    return Ok(());
                }
            }
        }

        // Stream ended without a [DONE] sentinel; parse any partial tail and
        // flush whatever calls accumulated.
        if let Some(tail) = lines.remainder() {
            let _ = process_sse_line(&tail, &mut state, sink.as_ref());
        }
        state.flush(sink.as_ref());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &'static str {
        self.provider_name
    }

    fn send_streaming(self: Arc<Self>, request: ChatRequest, sink: Arc<dyn ChunkSink>) -> AbortHandle {
        let (handle, mut signal) = AbortHandle::new();
        tokio::spawn(async move {
            if let Err(message) = self.stream_round(request, &sink, &mut signal).await {
                sink.emit(StreamChunk::Error { message });
            }
            sink.emit(StreamChunk::Done);
        });
        handle
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let endpoint = self.endpoint("models");
        let response = self
            .authorized(self.client.get(&endpoint))
            .send()
            .await
            .map_err(|e| ProviderError::Request(describe_transport_error(&e, &self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!(
                "{} error {status}: {text}",
                self.provider_name
            )));
        }

        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("model list parse failed: {e}")))?;
        Ok(listing.data.into_iter().map(|m| m.id).collect())
    }
}

// ---------------------------------------------------------------------------
// SSE parsing
// ---------------------------------------------------------------------------

/// Per-round parser state: accumulated text length (for tool-call content
/// offsets) and the per-index pending tool calls.
#[derive(Debug, Default)]
pub(crate) struct SseState {
    text_len: usize,
    pending: BTreeMap<usize, PendingToolCall>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
    content_offset: usize,
}

impl SseState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Emit every accumulated call and clear the pending map, so a second
    /// flush site (finish_reason plus stream end) cannot double-emit.
    pub(crate) fn flush(&mut self, sink: &dyn ChunkSink) {
        let pending = std::mem::take(&mut self.pending);
        for (_, entry) in pending {
            if entry.name.trim().is_empty() {
                continue;
            }
            let id = if entry.id.trim().is_empty() {
                ToolCall::local_id()
            } else {
                entry.id
            };
            let mut call = ToolCall::new(id, entry.name, parse_arguments(&entry.arguments));
            call.content_offset = Some(entry.content_offset);
            sink.emit(StreamChunk::ToolCall { tool_call: call });
        }
    }
}

/// Accumulated argument string parsed as a JSON object; anything else is
/// preserved under `_raw` rather than dropped.
fn parse_arguments(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    if raw.trim().is_empty() {
        return serde_json::Map::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => {
            let mut map = serde_json::Map::new();
            map.insert("_raw".to_string(), serde_json::Value::String(raw.to_string()));
            map
        }
    }
}

/// Handle one SSE line. Returns `true` on the `[DONE]` sentinel. Malformed
/// lines are skipped, never fatal.
pub(crate) fn process_sse_line(line: &str, state: &mut SseState, sink: &dyn ChunkSink) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') || trimmed.starts_with("event:") {
        return false;
    }

    let payload = trimmed
        .strip_prefix("data:")
        .map(|s| s.trim())
        .unwrap_or(trimmed);
    if payload.is_empty() {
        return false;
    }
    if payload == "[DONE]" {
        return true;
    }

    let parsed: SsePayload = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed SSE line");
            return false;
        }
    };

    for choice in parsed.choices {
        if let Some(delta) = choice.delta {
            if let Some(content) = delta.content {
                if !content.is_empty() {
                    state.text_len += content.len();
                    sink.emit(StreamChunk::Text { content });
                }
            }
            if let Some(reasoning) = delta.reasoning_content {
                if !reasoning.is_empty() {
                    sink.emit(StreamChunk::Thinking { content: reasoning });
                }
            }
            if let Some(calls) = delta.tool_calls {
                for call in calls {
                    let idx = call.index.unwrap_or(0);
                    let text_len = state.text_len;
                    let entry = state.pending.entry(idx).or_insert_with(|| PendingToolCall {
                        content_offset: text_len,
                        ..PendingToolCall::default()
                    });
                    if let Some(id) = call.id {
                        if !id.is_empty() {
                            entry.id = id;
                        }
                    }
                    if let Some(function) = call.function {
                        if let Some(name) = function.name {
                            entry.name.push_str(&name);
                        }
                        if let Some(arguments) = function.arguments {
                            entry.arguments.push_str(&arguments);
                        }
                    }
                }
            }
        }

        if choice.finish_reason.as_deref() == Some("tool_calls") {
            state.flush(sink);
        }
    }

    false
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct SsePayload {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Debug, Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: Option<SseDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<SseToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct SseToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<SseFunctionDelta>,
}

#[derive(Debug, Deserialize, Default)]
struct SseFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelListing {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}
