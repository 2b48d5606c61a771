//! Web search through the Tavily API

use async_trait::async_trait;
use colloquy_agent::tool::{Tool, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const TAVILY_BASE_URL: &str = "https://api.tavily.com";

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tavily API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("TAVILY_API_KEY is not set")]
    MissingApiKey,

    #[error("search cancelled")]
    Cancelled,
}

/// One search hit, as handed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub content: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// `tavily_search_results_json`: returns the top results as a JSON array
pub struct TavilySearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    max_results: u32,
}

impl TavilySearchTool {
    pub fn new(api_key: Option<String>, max_results: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: TAVILY_BASE_URL.to_string(),
            max_results: max_results.max(1),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        tracing::debug!("tavily search: {:?} (max {})", query, self.max_results);

        let response = self
            .client
            .post(&url)
            .json(&SearchRequest {
                api_key,
                query,
                max_results: self.max_results,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.results)
    }
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &str {
        "tavily_search_results_json"
    }

    fn description(&self) -> &str {
        "A search engine optimized for comprehensive, accurate, and trusted results. \
         Useful for when you need to answer questions about current events. \
         Input should be a search query."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "search query to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult {
        let query = match arguments.get("query").and_then(|v| v.as_str()) {
            Some(q) => q,
            None => return ToolResult::error("Missing 'query' argument"),
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SearchError::Cancelled),
            r = self.search(query) => r,
        };

        match outcome {
            Ok(hits) => ToolResult::json(&json!(hits)),
            Err(e) => {
                tracing::warn!("search failed: {}", e);
                ToolResult::error(e.to_string())
            }
        }
    }
}
