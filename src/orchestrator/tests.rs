use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use crate::config::Settings;
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::provider::types::{
    AbortHandle, ChatRequest, ChunkSink, Message, ProviderError, Role, StreamChunk, ToolCall,
    ToolDefinition,
};
use crate::provider::Provider;
use crate::tools::types::{Args, Tool, ToolContext, ToolError};
use crate::tools::ToolRegistry;

/// Plays back pre-scripted rounds of chunks, one script per invocation,
/// and records every request it receives.
struct ScriptedProvider {
    rounds: Mutex<VecDeque<Vec<StreamChunk>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn new(rounds: Vec<Vec<StreamChunk>>) -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request(&self, index: usize) -> ChatRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn send_streaming(
        self: Arc<Self>,
        request: ChatRequest,
        sink: Arc<dyn ChunkSink>,
    ) -> AbortHandle {
        self.requests.lock().unwrap().push(request);
        let script = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![StreamChunk::Done]);
        let (handle, _signal) = AbortHandle::new();
        tokio::spawn(async move {
            for chunk in script {
                sink.emit(chunk);
            }
        });
        handle
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Records execution order into a shared log.
struct RecordingTool {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl Tool for RecordingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.to_string(),
            description: format!("test tool {}", self.name),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn execute(
        &self,
        _args: &Args,
        _ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        self.log.lock().unwrap().push(self.name.to_string());
        Ok(serde_json::json!({"ok": self.name}))
    }
}

struct DisabledTool;

#[async_trait::async_trait]
impl Tool for DisabledTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "locked".to_string(),
            description: "never enabled".to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    fn enabled(&self, _settings: &Settings) -> bool {
        false
    }

    async fn execute(
        &self,
        _args: &Args,
        _ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        panic!("disabled tool must never execute");
    }
}

fn call(name: &str) -> StreamChunk {
    StreamChunk::ToolCall {
        tool_call: ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: serde_json::Map::new(),
            result: None,
            content_offset: None,
        },
    }
}

fn collecting_sink() -> (Arc<dyn ChunkSink>, Arc<Mutex<Vec<StreamChunk>>>) {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let writer = collected.clone();
    let sink: Arc<dyn ChunkSink> = Arc::new(move |chunk| writer.lock().unwrap().push(chunk));
    (sink, collected)
}

fn harness(
    rounds: Vec<Vec<StreamChunk>>,
    settings: Settings,
) -> (
    Orchestrator,
    Arc<ScriptedProvider>,
    ToolContext,
    ChatRequest,
    Arc<Mutex<Vec<String>>>,
) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(RecordingTool {
        name: "alpha",
        log: log.clone(),
    }));
    registry.register(Box::new(RecordingTool {
        name: "beta",
        log: log.clone(),
    }));
    registry.register(Box::new(DisabledTool));

    let orchestrator = Orchestrator::new(Arc::new(registry));
    let provider = ScriptedProvider::new(rounds);
    let ctx = ToolContext::new(Arc::new(settings));
    let request = ChatRequest {
        model: "test-model".to_string(),
        messages: vec![Message::user("hi")],
        tools: Vec::new(),
        temperature: None,
        max_tokens: None,
        reasoning: false,
    };
    (orchestrator, provider, ctx, request, log)
}

fn chunk_kinds(chunks: &[StreamChunk]) -> Vec<&'static str> {
    chunks
        .iter()
        .map(|chunk| match chunk {
            StreamChunk::Text { .. } => "text",
            StreamChunk::Thinking { .. } => "thinking",
            StreamChunk::ToolCall { .. } => "tool_call",
            StreamChunk::ToolResult { .. } => "tool_result",
            StreamChunk::Error { .. } => "error",
            StreamChunk::Done => "done",
        })
        .collect()
}

#[tokio::test]
async fn plain_round_appends_assistant_message() {
    let rounds = vec![vec![
        StreamChunk::Text {
            content: "Hello ".to_string(),
        },
        StreamChunk::Text {
            content: "world".to_string(),
        },
        StreamChunk::Done,
    ]];
    let (orchestrator, provider, ctx, request, _log) = harness(rounds, Settings::default());
    let (sink, collected) = collecting_sink();

    let history = orchestrator
        .run("chan", provider, request, &ctx, sink)
        .await
        .unwrap();

    let last = history.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.text(), Some("Hello world".to_string()));
    assert_eq!(
        chunk_kinds(&collected.lock().unwrap()),
        vec!["text", "text", "done"]
    );
}

#[tokio::test]
async fn tool_round_executes_and_continues() {
    let rounds = vec![
        vec![
            StreamChunk::Text {
                content: "let me check".to_string(),
            },
            call("alpha"),
            StreamChunk::Done,
        ],
        vec![
            StreamChunk::Text {
                content: "all done".to_string(),
            },
            StreamChunk::Done,
        ],
    ];
    let (orchestrator, provider, ctx, request, log) = harness(rounds, Settings::default());
    let (sink, collected) = collecting_sink();

    let history = orchestrator
        .run("chan", provider.clone(), request, &ctx, sink)
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["alpha"]);
    // One Done across both rounds; the intermediate one is swallowed.
    assert_eq!(
        chunk_kinds(&collected.lock().unwrap()),
        vec!["text", "tool_call", "tool_result", "text", "done"]
    );

    // Second request carries the assistant tool-call turn plus one tool
    // message, in that order.
    let second = provider.request(1);
    let len = second.messages.len();
    let assistant = &second.messages[len - 2];
    assert_eq!(assistant.role, Role::Assistant);
    let calls = assistant.tool_calls.as_ref().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].result, Some(serde_json::json!({"ok": "alpha"})));
    let tool_msg = &second.messages[len - 1];
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_alpha"));

    assert_eq!(history.last().unwrap().text(), Some("all done".to_string()));
}

#[tokio::test]
async fn multiple_calls_execute_in_stream_order() {
    let rounds = vec![
        vec![call("beta"), call("alpha"), StreamChunk::Done],
        vec![StreamChunk::Done],
    ];
    let (orchestrator, provider, ctx, request, log) = harness(rounds, Settings::default());
    let (sink, collected) = collecting_sink();

    orchestrator
        .run("chan", provider, request, &ctx, sink)
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["beta", "alpha"]);
    let collected = collected.lock().unwrap();
    let results: Vec<String> = collected
        .iter()
        .filter_map(|chunk| match chunk {
            StreamChunk::ToolResult { tool_call } => Some(tool_call.name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(results, vec!["beta", "alpha"]);
}

#[tokio::test]
async fn budget_stops_before_executing() {
    let settings = Settings {
        max_tool_calls: 1,
        ..Settings::default()
    };
    let rounds = vec![vec![call("alpha"), call("beta"), StreamChunk::Done]];
    let (orchestrator, provider, ctx, request, log) = harness(rounds, settings);
    let (sink, collected) = collecting_sink();

    let err = orchestrator
        .run("chan", provider, request, &ctx, sink)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::ToolBudgetExceeded(1)));
    assert!(log.lock().unwrap().is_empty());
    let collected = collected.lock().unwrap();
    assert_eq!(
        chunk_kinds(&collected),
        vec!["tool_call", "tool_call", "error", "done"]
    );
    match &collected[2] {
        StreamChunk::Error { message } => {
            assert!(message.contains("maximum tool calls exceeded"), "{message}");
        }
        other => panic!("expected error chunk, got {other:?}"),
    }
}

#[tokio::test]
async fn budget_is_cumulative_across_rounds() {
    let settings = Settings {
        max_tool_calls: 2,
        ..Settings::default()
    };
    let rounds = vec![
        vec![call("alpha"), call("beta"), StreamChunk::Done],
        vec![call("alpha"), StreamChunk::Done],
    ];
    let (orchestrator, provider, ctx, request, log) = harness(rounds, settings);
    let (sink, _collected) = collecting_sink();

    let err = orchestrator
        .run("chan", provider, request, &ctx, sink)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::ToolBudgetExceeded(2)));
    // The first round's calls ran; the third call never did.
    assert_eq!(*log.lock().unwrap(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn disabled_tool_yields_permission_denied_result() {
    let rounds = vec![
        vec![call("locked"), StreamChunk::Done],
        vec![StreamChunk::Done],
    ];
    let (orchestrator, provider, ctx, request, _log) = harness(rounds, Settings::default());
    let (sink, collected) = collecting_sink();

    orchestrator
        .run("chan", provider.clone(), request, &ctx, sink)
        .await
        .unwrap();

    let collected = collected.lock().unwrap();
    let result = collected
        .iter()
        .find_map(|chunk| match chunk {
            StreamChunk::ToolResult { tool_call } => tool_call.result.clone(),
            _ => None,
        })
        .unwrap();
    assert_eq!(result["code"], "PERMISSION_DENIED");
    assert_eq!(result["error"], "tool not available: locked");

    // Disabled tools are not advertised either.
    let first = provider.request(0);
    assert!(first.tools.iter().all(|tool| tool.name != "locked"));
}

#[tokio::test]
async fn provider_error_terminates_without_tool_execution() {
    let rounds = vec![vec![
        call("alpha"),
        StreamChunk::Error {
            message: "upstream fell over".to_string(),
        },
        StreamChunk::Done,
    ]];
    let (orchestrator, provider, ctx, request, log) = harness(rounds, Settings::default());
    let (sink, collected) = collecting_sink();

    let err = orchestrator
        .run("chan", provider, request, &ctx, sink)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Provider(ref msg) if msg == "upstream fell over"));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(
        chunk_kinds(&collected.lock().unwrap()),
        vec!["tool_call", "error", "done"]
    );
}

#[tokio::test]
async fn advertised_tools_are_sorted_and_enabled_only() {
    let rounds = vec![vec![StreamChunk::Done]];
    let (orchestrator, provider, ctx, request, _log) = harness(rounds, Settings::default());
    let (sink, _collected) = collecting_sink();

    orchestrator
        .run("chan", provider.clone(), request, &ctx, sink)
        .await
        .unwrap();

    let names: Vec<String> = provider
        .request(0)
        .tools
        .iter()
        .map(|tool| tool.name.clone())
        .collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}

#[test]
fn cancel_unknown_channel_is_a_no_op() {
    let orchestrator = Orchestrator::new(Arc::new(ToolRegistry::new()));
    assert!(!orchestrator.cancel("nope"));
}
