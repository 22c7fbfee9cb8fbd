//! Shared types and traits for the tool system: the `Tool` trait, execution
//! context, the confirmation collaborator, and argument validation helpers.

use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::jail::JailError;
use crate::provider::types::ToolDefinition;

/// Tool arguments as delivered by the model: always a JSON object.
pub type Args = serde_json::Map<String, serde_json::Value>;

/// Errors a tool execution can surface. Dispatch converts every one of
/// these into a structured result; they never abort the orchestration loop.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Jail(#[from] JailError),
    #[error("{0}")]
    Execution(String),
}

impl ToolError {
    pub fn invalid_input(tool: &str, message: impl std::fmt::Display) -> Self {
        ToolError::Jail(JailError::InvalidInput(format!("{tool}: {message}")))
    }

    pub const fn code(&self) -> &'static str {
        match self {
            ToolError::Jail(err) => err.code(),
            ToolError::Execution(_) => "EXECUTION_FAILED",
        }
    }

    /// The `{error, code}` shape fed back to the model.
    pub fn to_result_value(&self) -> serde_json::Value {
        serde_json::json!({"error": self.to_string(), "code": self.code()})
    }
}

/// Asked before destructive file actions (overwrites). The jail itself
/// never prompts; this is the host dialog surface. The default approves
/// everything, for headless use and tests.
#[async_trait::async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

pub struct ApproveAll;

#[async_trait::async_trait]
impl Confirmer for ApproveAll {
    async fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Per-orchestration execution context handed to every tool.
#[derive(Clone)]
pub struct ToolContext {
    pub settings: Arc<Settings>,
    pub confirmer: Arc<dyn Confirmer>,
}

impl ToolContext {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            confirmer: Arc::new(ApproveAll),
        }
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// The jail root. File tools refuse to run without one.
    pub fn workspace_root(&self) -> Result<&Path, ToolError> {
        self.settings
            .workspace_root
            .as_deref()
            .ok_or(ToolError::Jail(JailError::WorkspaceNotSet))
    }
}

/// A single registered tool: self-describing schema plus async executor.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Whether the tool is currently usable (e.g. a required API key is
    /// configured). Disabled tools are neither advertised nor dispatched.
    fn enabled(&self, _settings: &Settings) -> bool {
        true
    }

    async fn execute(&self, args: &Args, ctx: &ToolContext)
        -> Result<serde_json::Value, ToolError>;
}

// ---------------------------------------------------------------------------
// Argument validation helpers
// ---------------------------------------------------------------------------

pub fn required_str<'a>(tool: &str, args: &'a Args, key: &str) -> Result<&'a str, ToolError> {
    match args.get(key) {
        Some(serde_json::Value::String(s)) => Ok(s),
        Some(_) => Err(ToolError::invalid_input(
            tool,
            format!("'{key}' must be a string"),
        )),
        None => Err(ToolError::invalid_input(tool, format!("'{key}' is required"))),
    }
}

pub fn optional_str<'a>(
    tool: &str,
    args: &'a Args,
    key: &str,
) -> Result<Option<&'a str>, ToolError> {
    match args.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ToolError::invalid_input(
            tool,
            format!("'{key}' must be a string"),
        )),
    }
}

pub fn optional_bool(tool: &str, args: &Args, key: &str, default: bool) -> Result<bool, ToolError> {
    match args.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ToolError::invalid_input(
            tool,
            format!("'{key}' must be a boolean"),
        )),
    }
}

/// Bounds for [`bounded_u64`].
#[derive(Debug, Clone, Copy)]
pub struct NumberSpec {
    pub default: u64,
    pub min: u64,
    pub max: u64,
}

/// Integer argument with a default and inclusive bounds. Whole-valued
/// floats coerce; anything else, or an out-of-range value, is
/// `INVALID_INPUT`.
pub fn bounded_u64(tool: &str, args: &Args, key: &str, spec: NumberSpec) -> Result<u64, ToolError> {
    let value = match args.get(key) {
        None | Some(serde_json::Value::Null) => return Ok(spec.default),
        Some(serde_json::Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                v
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f >= 0.0 {
                    f as u64
                } else {
                    return Err(ToolError::invalid_input(
                        tool,
                        format!("'{key}' must be a non-negative integer"),
                    ));
                }
            } else {
                return Err(ToolError::invalid_input(
                    tool,
                    format!("'{key}' must be a non-negative integer"),
                ));
            }
        }
        Some(_) => {
            return Err(ToolError::invalid_input(
                tool,
                format!("'{key}' must be a number"),
            ))
        }
    };

    if value < spec.min || value > spec.max {
        return Err(ToolError::invalid_input(
            tool,
            format!("'{key}' must be between {} and {}", spec.min, spec.max),
        ));
    }
    Ok(value)
}
