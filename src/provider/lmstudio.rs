//! LM Studio provider adapter.
//!
//! Dual mode. Configured as OpenAI-compatible it delegates wholesale to the
//! OpenAI adapter against a base URL normalized to end in `/v1`. Configured
//! as native it speaks LM Studio's own JSON-lines protocol on
//! `POST …/api/v1/chat`, where content may appear under
//! `choices[0].delta.content`, `message.content`, or a bare top-level
//! `content` depending on server version, and termination is signaled by
//! `done == true` or `finish_reason == "stop"`. Servers that predate the
//! `reasoning` request parameter reject it with HTTP 400; the adapter
//! retries once without it instead of failing the round.

use std::sync::Arc;

use futures::StreamExt;

use crate::provider::openai::OpenAiCompatProvider;
use crate::provider::shared::{
    describe_transport_error, wire_messages, wire_tools, LineBuffer,
};
use crate::provider::types::{
    AbortHandle, AbortSignal, ChatRequest, ChunkSink, ProviderError, StreamChunk, ToolCall,
};
use crate::provider::Provider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmStudioMode {
    OpenAiCompat,
    Native,
}

pub struct LmStudioProvider {
    base_url: String,
    client: reqwest::Client,
    /// Present in OpenAI-compatible mode; all calls route through it.
    delegate: Option<Arc<OpenAiCompatProvider>>,
}

impl LmStudioProvider {
    pub fn new(base_url: impl Into<String>, mode: LmStudioMode) -> Self {
        let base_url = base_url.into();
        let delegate = match mode {
            LmStudioMode::OpenAiCompat => Some(Arc::new(OpenAiCompatProvider::with_name(
                normalize_v1_base(&base_url),
                None,
                "lmstudio",
            ))),
            LmStudioMode::Native => None,
        };
        Self {
            base_url,
            client: reqwest::Client::new(),
            delegate,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn stream_native(
        &self,
        request: ChatRequest,
        sink: &Arc<dyn ChunkSink>,
        signal: &mut AbortSignal,
    ) -> Result<(), String> {
        let endpoint = self.endpoint("api/v1/chat");
        tracing::debug!(%endpoint, model = %request.model, "sending lmstudio native chat request");

        let mut response = self
            .client
            .post(&endpoint)
            .json(&native_body(&request, request.reasoning))
            .send()
            .await
            .map_err(|e| describe_transport_error(&e, &self.base_url))?;

        // Older servers reject the reasoning parameter outright; degrade
        // instead of failing the round.
        if response.status().as_u16() == 400 && request.reasoning {
            tracing::debug!("lmstudio rejected reasoning parameter, retrying without it");
            response = self
                .client
                .post(&endpoint)
                .json(&native_body(&request, false))
                .send()
                .await
                .map_err(|e| describe_transport_error(&e, &self.base_url))?;
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("lmstudio error {status}: {text}"));
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();

        loop {
            let chunk = tokio::select! {
                _ = signal.aborted() => {
                    tracing::debug!("lmstudio stream aborted by caller");
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
                if process_native_line(&line, sink.as_ref()) {
                    return Ok(());
                }
            }
        }

        if let Some(tail) = lines.remainder() {
            let _ = process_native_line(&tail, sink.as_ref());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Provider for LmStudioProvider {
    fn name(&self) -> &'static str {
        "lmstudio"
    }

    fn send_streaming(self: Arc<Self>, request: ChatRequest, sink: Arc<dyn ChunkSink>) -> AbortHandle {
        if let Some(delegate) = &self.delegate {
            return delegate.clone().send_streaming(request, sink);
        }
        let (handle, mut signal) = AbortHandle::new();
        tokio::spawn(async move {
            if let Err(message) = self.stream_native(request, &sink, &mut signal).await {
                sink.emit(StreamChunk::Error { message });
            }
            sink.emit(StreamChunk::Done);
        });
        handle
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        if let Some(delegate) = &self.delegate {
            return delegate.list_models().await;
        }

        let endpoint = self.endpoint("api/v1/models");
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| ProviderError::Request(describe_transport_error(&e, &self.base_url)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!(
                "lmstudio error {status}: {text}"
            )));
        }

        let listing: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("model list parse failed: {e}")))?;
        let models = listing
            .get("data")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("id").and_then(|id| id.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }
}

/// LM Studio's OpenAI-compatible surface lives under `/v1`.
pub(crate) fn normalize_v1_base(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

pub(crate) fn native_body(request: &ChatRequest, include_reasoning: bool) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": wire_messages(&request.messages),
        "stream": true,
    });
    if let Some(tools) = wire_tools(&request.tools) {
        body["tools"] = serde_json::to_value(tools).unwrap_or_default();
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if include_reasoning {
        body["reasoning"] = serde_json::json!(true);
    }
    body
}

// ---------------------------------------------------------------------------
// Native stream parsing
// ---------------------------------------------------------------------------

/// Handle one native JSON line. Returns `true` on termination
/// (`done == true` or `finish_reason == "stop"`). Malformed lines skip.
pub(crate) fn process_native_line(line: &str, sink: &dyn ChunkSink) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    // Some builds frame native responses as SSE-ish `data:` lines; accept
    // both.
    let payload = trimmed
        .strip_prefix("data:")
        .map(|s| s.trim())
        .unwrap_or(trimmed);
    if payload == "[DONE]" {
        return true;
    }

    let parsed: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed lmstudio line");
            return false;
        }
    };

    if let Some(content) = extract_content(&parsed) {
        if !content.is_empty() {
            sink.emit(StreamChunk::Text {
                content: content.to_string(),
            });
        }
    }
    if let Some(reasoning) = extract_reasoning(&parsed) {
        if !reasoning.is_empty() {
            sink.emit(StreamChunk::Thinking {
                content: reasoning.to_string(),
            });
        }
    }
    for call in extract_tool_calls(&parsed) {
        sink.emit(StreamChunk::ToolCall { tool_call: call });
    }

    is_terminal(&parsed)
}

/// Content location varies by server version; try the delta shape, then the
/// message shape, then a bare field.
fn extract_content(payload: &serde_json::Value) -> Option<&str> {
    payload
        .pointer("/choices/0/delta/content")
        .or_else(|| payload.pointer("/message/content"))
        .or_else(|| payload.get("content"))
        .and_then(|v| v.as_str())
}

fn extract_reasoning(payload: &serde_json::Value) -> Option<&str> {
    payload
        .pointer("/choices/0/delta/reasoning_content")
        .or_else(|| payload.pointer("/message/reasoning_content"))
        .or_else(|| payload.get("reasoning"))
        .and_then(|v| v.as_str())
}

fn extract_tool_calls(payload: &serde_json::Value) -> Vec<ToolCall> {
    let raw = payload
        .pointer("/message/tool_calls")
        .or_else(|| payload.get("tool_calls"))
        .and_then(|v| v.as_array());
    let Some(raw) = raw else {
        return Vec::new();
    };

    raw.iter()
        .filter_map(|entry| {
            let function = entry.get("function")?;
            let name = function.get("name")?.as_str()?;
            if name.trim().is_empty() {
                return None;
            }
            let arguments = match function.get("arguments") {
                Some(serde_json::Value::Object(map)) => map.clone(),
                Some(serde_json::Value::String(raw_args)) => {
                    match serde_json::from_str::<serde_json::Value>(raw_args) {
                        Ok(serde_json::Value::Object(map)) => map,
                        _ => {
                            let mut map = serde_json::Map::new();
                            map.insert(
                                "_raw".to_string(),
                                serde_json::Value::String(raw_args.clone()),
                            );
                            map
                        }
                    }
                }
                _ => serde_json::Map::new(),
            };
            let id = entry
                .get("id")
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(ToolCall::local_id);
            Some(ToolCall::new(id, name, arguments))
        })
        .collect()
}

fn is_terminal(payload: &serde_json::Value) -> bool {
    if payload.get("done").and_then(|v| v.as_bool()) == Some(true) {
        return true;
    }
    payload
        .pointer("/choices/0/finish_reason")
        .and_then(|v| v.as_str())
        == Some("stop")
}
