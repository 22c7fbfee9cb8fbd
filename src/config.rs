//! Engine configuration supplied by the host application's settings layer.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default cumulative tool-call budget per orchestration.
pub const DEFAULT_MAX_TOOL_CALLS: usize = 25;

/// Supported provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAiCompat,
    Ollama,
    LmStudio,
}

impl ProviderKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAiCompat => "openai-compat",
            ProviderKind::Ollama => "ollama",
            ProviderKind::LmStudio => "lmstudio",
        }
    }

    pub const fn all() -> &'static [ProviderKind] {
        &[
            ProviderKind::OpenAiCompat,
            ProviderKind::Ollama,
            ProviderKind::LmStudio,
        ]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai-compat" | "openai" | "openai_compat" => Ok(ProviderKind::OpenAiCompat),
            "ollama" => Ok(ProviderKind::Ollama),
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(ProviderKind::LmStudio),
            _ => Err(format!("unknown provider: {}", s)),
        }
    }
}

impl Serialize for ProviderKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ProviderKind::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Engine settings. The host application owns validation and persistence;
/// the engine only reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    /// LM Studio only: route through its OpenAI-compatible surface instead
    /// of the native protocol.
    pub lmstudio_openai_compat: bool,
    /// Cumulative tool-call budget across a whole orchestration.
    pub max_tool_calls: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Request a reasoning trace where the provider supports one.
    pub reasoning: bool,
    /// Workspace the file tools are jailed to. File tools refuse to run
    /// while unset.
    pub workspace_root: Option<PathBuf>,
    /// API key for the web search tool; the tool is disabled without it.
    pub search_api_key: Option<String>,
    /// Ask the confirmation collaborator before overwriting existing files.
    pub confirm_overwrite: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            lmstudio_openai_compat: false,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            temperature: None,
            max_tokens: None,
            reasoning: false,
            workspace_root: None,
            search_api_key: None,
            confirm_overwrite: true,
        }
    }
}
