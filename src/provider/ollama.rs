//! Ollama provider adapter (NDJSON framing).
//!
//! `POST /api/chat` streams one complete JSON object per line; there is no
//! sentinel line — the final object carries `"done": true`. Tool calls
//! arrive whole (Ollama does not fragment arguments), so they map 1:1 to
//! canonical chunks with locally assigned ids. `message.thinking` may be a
//! string, an array of parts, or a nested object, and is flattened
//! recursively into a single `thinking` chunk per line.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::provider::shared::{describe_transport_error, flat_text_content, LineBuffer};
use crate::provider::types::{
    AbortHandle, AbortSignal, ChatRequest, ChunkSink, Message, ProviderError, StreamChunk,
    ToolCall, ToolDefinition,
};
use crate::provider::Provider;

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn stream_round(
        &self,
        request: ChatRequest,
        sink: &Arc<dyn ChunkSink>,
        signal: &mut AbortSignal,
    ) -> Result<(), String> {
        let body = OllamaChatBody::from_request(&request);
        let endpoint = self.endpoint("api/chat");
        tracing::debug!(%endpoint, model = %request.model, "sending ollama chat request");

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| describe_transport_error(&e, &self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("ollama error {status}: {text}"));
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::new();

        loop {
            let chunk = tokio::select! {
                _ = signal.aborted() => {
                    tracing::debug!("ollama stream aborted by caller");
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
                if process_ndjson_line(&line, sink.as_ref()) {
                    return Ok(());
                }
            }
        }

        if let Some(tail) = lines.remainder() {
            if process_ndjson_line(&tail, sink.as_ref()) {
                return Ok(());
            }
        }
        // Stream ended without ever seeing done:true; the caller still gets
        // its terminal chunk from the spawned task.
        tracing::warn!("ollama stream ended without done flag");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
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
        let endpoint = self.endpoint("api/tags");
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
                "ollama error {status}: {text}"
            )));
        }

        let listing: TagListing = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("tag list parse failed: {e}")))?;
        Ok(listing.models.into_iter().map(|m| m.name).collect())
    }
}

// ---------------------------------------------------------------------------
// NDJSON parsing
// ---------------------------------------------------------------------------

/// Handle one NDJSON line, emitting canonical chunks. Returns `true` when
/// the line carried `done: true`. Malformed lines are skipped.
pub(crate) fn process_ndjson_line(line: &str, sink: &dyn ChunkSink) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    let parsed: OllamaStreamLine = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed ollama line");
            return false;
        }
    };

    if let Some(message) = parsed.message {
        if let Some(content) = message.content {
            if !content.is_empty() {
                sink.emit(StreamChunk::Text { content });
            }
        }
        if let Some(thinking) = message.thinking {
            let flattened = flatten_thinking(&thinking);
            if !flattened.is_empty() {
                sink.emit(StreamChunk::Thinking { content: flattened });
            }
        }
        for call in message.tool_calls.unwrap_or_default() {
            let arguments = match call.function.arguments {
                serde_json::Value::Object(map) => map,
                serde_json::Value::String(raw) => {
                    match serde_json::from_str::<serde_json::Value>(&raw) {
                        Ok(serde_json::Value::Object(map)) => map,
                        _ => {
                            let mut map = serde_json::Map::new();
                            map.insert("_raw".to_string(), serde_json::Value::String(raw));
                            map
                        }
                    }
                }
                _ => serde_json::Map::new(),
            };
            sink.emit(StreamChunk::ToolCall {
                tool_call: ToolCall::new(ToolCall::local_id(), call.function.name, arguments),
            });
        }
    }

    parsed.done
}

/// Reduce whatever shape Ollama sent for `thinking` to plain text: strings
/// pass through, arrays concatenate, objects prefer their `text`/`content`
/// field and otherwise concatenate all values.
pub(crate) fn flatten_thinking(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items.iter().map(flatten_thinking).collect(),
        serde_json::Value::Object(map) => {
            for key in ["text", "content", "thinking"] {
                if let Some(inner) = map.get(key) {
                    return flatten_thinking(inner);
                }
            }
            map.values().map(flatten_thinking).collect()
        }
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct OllamaChatBody {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OllamaTool>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    think: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

impl OllamaChatBody {
    fn from_request(request: &ChatRequest) -> Self {
        let options = if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        };
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream: true,
            tools: ollama_tools(&request.tools),
            think: request.reasoning,
            options,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<serde_json::Value>>,
}

impl From<&Message> for OllamaMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = message
            .tool_calls
            .as_ref()
            .filter(|calls| !calls.is_empty())
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| {
                        serde_json::json!({
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments,
                            },
                        })
                    })
                    .collect()
            });
        Self {
            role: message.role.as_str(),
            content: flat_text_content(message),
            tool_calls,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: serde_json::Value,
}

fn ollama_tools(tools: &[ToolDefinition]) -> Option<Vec<OllamaTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|def| OllamaTool {
                tool_type: "function",
                function: serde_json::json!({
                    "name": def.name,
                    "description": def.description,
                    "parameters": def.parameters,
                }),
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
struct OllamaStreamLine {
    #[serde(default)]
    message: Option<OllamaStreamMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<serde_json::Value>,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TagListing {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}
