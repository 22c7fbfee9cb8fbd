//! Web search tool backed by the Brave Search API.
//!
//! Only enabled when a search API key is configured; without one the tool
//! is neither advertised to the model nor dispatchable.

use serde::Deserialize;

use crate::config::Settings;
use crate::provider::types::ToolDefinition;
use crate::tools::types::{bounded_u64, required_str, Args, NumberSpec, Tool, ToolContext, ToolError};

const SEARCH_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self::with_endpoint(SEARCH_ENDPOINT)
    }

    /// Endpoint override for tests.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the web and return the top results with title, URL, and a short description.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "count": {"type": "integer", "description": "Number of results to return (default: 5, max: 10)"}
                },
                "required": ["query"]
            }),
        }
    }

    fn enabled(&self, settings: &Settings) -> bool {
        settings
            .search_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    async fn execute(
        &self,
        args: &Args,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let query = required_str("web_search", args, "query")?;
        if query.trim().is_empty() {
            return Err(ToolError::invalid_input(
                "web_search",
                "'query' must not be empty",
            ));
        }
        let count = bounded_u64(
            "web_search",
            args,
            "count",
            NumberSpec {
                default: 5,
                min: 1,
                max: 10,
            },
        )?;

        let Some(api_key) = ctx.settings.search_api_key.as_deref() else {
            return Err(ToolError::Execution(
                "web search is not configured (missing API key)".into(),
            ));
        };

        let response = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[("q", query), ("count", &count.to_string())])
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::Execution(format!(
                "search API error {status}: {text}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("search response parse failed: {e}")))?;

        let results: Vec<serde_json::Value> = parsed
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .take(count as usize)
            .map(|result| {
                serde_json::json!({
                    "title": result.title,
                    "url": result.url,
                    "description": result.description,
                })
            })
            .collect();

        Ok(serde_json::json!({
            "query": query,
            "results": results,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}
