//! Pieces shared by the provider adapters: line framing over the raw byte
//! stream, OpenAI-wire request marshalling, and transport error hints.

use serde::Serialize;

use crate::provider::types::{
    ContentPart, Message, MessageContent, ToolCall, ToolDefinition,
};

/// Reassembles complete lines from arbitrarily split byte chunks.
///
/// HTTP streaming hands the body back in whatever chunk sizes the transport
/// felt like; both SSE and NDJSON framing are line-oriented, so every
/// adapter funnels its bytes through one of these. Raw bytes are buffered
/// and decoded only per complete line: `\n` is always a character boundary
/// in UTF-8, so a multi-byte character split across two chunks reassembles
/// intact. Trailing `\r` is stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every line completed by this chunk.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(newline_idx) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=newline_idx).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left after the stream ended without a final newline.
    pub fn remainder(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buf);
        let tail = String::from_utf8_lossy(&tail);
        let tail = tail.trim_end_matches('\r');
        if tail.trim().is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }
}

/// Human-readable failure message for a request that never produced a
/// response, with a hint when the server simply is not there.
pub fn describe_transport_error(err: &reqwest::Error, base_url: &str) -> String {
    if err.is_connect() {
        return format!(
            "could not reach {base_url} (connection refused) — is the server running? {err}"
        );
    }
    if err.is_timeout() {
        return format!("request to {base_url} timed out: {err}");
    }
    format!("request failed: {err}")
}

// ---------------------------------------------------------------------------
// OpenAI wire shapes (shared by the OpenAI-compatible and LM-Studio-native
// adapters)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: WireFunction,
}

#[derive(Debug, Serialize)]
pub struct WireFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Tool definitions in OpenAI function-calling shape, or `None` when the
/// request carries no tools (providers reject empty tool arrays).
pub fn wire_tools(tools: &[ToolDefinition]) -> Option<Vec<WireTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|def| WireTool {
                tool_type: "function",
                function: WireFunction {
                    name: def.name.clone(),
                    description: def.description.clone(),
                    parameters: def.parameters.clone(),
                },
            })
            .collect(),
    )
}

/// Translate the canonical history into OpenAI-wire messages.
pub fn wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages.iter().map(wire_message).collect()
}

fn wire_message(message: &Message) -> WireMessage {
    let content = match &message.content {
        None => serde_json::Value::Null,
        Some(MessageContent::Text(text)) => serde_json::Value::String(text.clone()),
        Some(MessageContent::Parts(parts)) => {
            serde_json::Value::Array(parts.iter().map(wire_part).collect())
        }
    };
    let tool_calls = message
        .tool_calls
        .as_ref()
        .filter(|calls| !calls.is_empty())
        .map(|calls| calls.iter().map(wire_tool_call).collect());

    WireMessage {
        role: message.role.as_str(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn wire_part(part: &ContentPart) -> serde_json::Value {
    match part {
        ContentPart::Text { text } => serde_json::json!({"type": "text", "text": text}),
        ContentPart::Image { media_type, data } => serde_json::json!({
            "type": "image_url",
            "image_url": {"url": format!("data:{media_type};base64,{data}")},
        }),
    }
}

/// Echo a previously collected assistant tool call back onto the wire.
/// Arguments travel as a JSON-encoded string, as the protocol demands.
fn wire_tool_call(call: &ToolCall) -> serde_json::Value {
    serde_json::json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": serde_json::Value::Object(call.arguments.clone()).to_string(),
        },
    })
}

/// History rendered for providers that want plain-text message content
/// (Ollama). Image parts are dropped; their text siblings survive.
pub fn flat_text_content(message: &Message) -> String {
    match &message.content {
        None => String::new(),
        Some(MessageContent::Text(text)) => text.clone(),
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
