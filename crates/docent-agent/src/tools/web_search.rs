//! Web search tool.
//!
//! The search provider is injected through [`WebSearchBackend`]; the tool
//! only formats the top hits for the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;
use crate::tools::{string_arg, ArgKind, ArgumentSchema, Tool, ToolOutput};

/// Default number of hits shown to the model.
pub const DEFAULT_MAX_RESULTS: usize = 3;

/// One search engine hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchHit {
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A web search provider.
#[async_trait]
pub trait WebSearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSearchHit>, AgentError>;
}

/// `web_search(query)`.
pub struct WebSearchTool {
    backend: Arc<dyn WebSearchBackend>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn WebSearchBackend>) -> Self {
        Self {
            backend,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information, news, or facts."
    }

    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema::new().required("query", ArgKind::String, "The search query to look up on the web.")
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, AgentError> {
        let query = string_arg(self.name(), &arguments, "query")?;
        let mut hits = self.backend.search(query, self.max_results).await?;
        hits.truncate(self.max_results);

        if hits.is_empty() {
            return Ok(ToolOutput::text(format!("No results found for '{}'", query)));
        }

        let blocks: Vec<String> = hits
            .iter()
            .map(|hit| format!("Title: {}\nSnippet: {}\n", hit.title, hit.snippet))
            .collect();
        let citations = hits
            .iter()
            .map(|hit| match &hit.url {
                Some(url) => format!("{} ({})", hit.title, url),
                None => hit.title.clone(),
            })
            .collect();

        tracing::debug!(query, hits = hits.len(), "Web search completed");
        Ok(ToolOutput::text(format!(
            "Search results for '{}':\n\n{}",
            query,
            blocks.join("\n---\n")
        ))
        .with_citations(citations))
    }
}

/// Offline backend that matches queries against a fixed set of pages.
///
/// A page matches when its title or snippet contains any query word
/// (case-insensitive). Pages keep their original order.
#[derive(Debug, Clone, Default)]
pub struct StaticSearchBackend {
    pages: Vec<WebSearchHit>,
}

impl StaticSearchBackend {
    pub fn new(pages: Vec<WebSearchHit>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl WebSearchBackend for StaticSearchBackend {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSearchHit>, AgentError> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .filter(|w| w.len() > 1)
            .collect();

        Ok(self
            .pages
            .iter()
            .filter(|page| {
                let haystack = format!("{} {}", page.title, page.snippet).to_lowercase();
                words.iter().any(|w| haystack.contains(w.as_str()))
            })
            .take(max_results)
            .cloned()
            .collect())
    }
}
