//! Tool registry: the name → (schema, executor) table.
//!
//! Constructed explicitly at startup — `ToolRegistry::new()` plus
//! `register()` calls, or `with_builtin_tools()` — so there is no global
//! state and no import-order dependence. Dispatch converts every tool
//! failure into a structured `{error, code}` result; a failing tool is
//! information for the model, never a reason to abort the loop.

use std::collections::{HashMap, HashSet};

use crate::config::Settings;
use crate::provider::types::ToolDefinition;
use crate::tools::fs::{ListDirectoryTool, ReadFileTool, WriteFileTool};
use crate::tools::types::{Args, Tool, ToolContext};
use crate::tools::web::WebSearchTool;

pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry with the built-in workspace and web tools.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(ListDirectoryTool));
        registry.register(Box::new(WebSearchTool::new()));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    /// Definitions of the currently enabled tools, sorted by name, in the
    /// shape every adapter echoes to its provider.
    pub fn definitions(&self, settings: &Settings) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|tool| tool.enabled(settings))
            .map(|tool| tool.definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Names the orchestrator accepts for dispatch this run.
    pub fn enabled_names(&self, settings: &Settings) -> HashSet<String> {
        self.tools
            .iter()
            .filter(|(_, tool)| tool.enabled(settings))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Execute a tool call, converting any failure into the `{error, code}`
    /// result shape.
    pub async fn dispatch(&self, name: &str, args: &Args, ctx: &ToolContext) -> serde_json::Value {
        let Some(tool) = self.tools.get(name) else {
            // The orchestrator already filters unknown names; this is the
            // backstop for direct callers.
            return serde_json::json!({
                "error": format!("tool not available: {name}"),
                "code": "PERMISSION_DENIED",
            });
        };

        match tool.execute(args, ctx).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(tool = name, error = %err, code = err.code(), "tool call failed");
                err.to_result_value()
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtin_tools()
    }
}
