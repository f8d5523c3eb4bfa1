//! Document retrieval tool.
//!
//! Lets the model pull provenance-tagged excerpts from the retriever's
//! collection when it decides a question needs documentation.

use async_trait::async_trait;
use serde_json::{Map, Value};

use docent_vector::retriever::Retriever;

use crate::error::AgentError;
use crate::tools::{string_arg, ArgKind, ArgumentSchema, Tool, ToolOutput};

const NO_RESULTS: &str = "No relevant documentation found.";

/// `retrieve_documents(query)`.
pub struct RetrieveDocumentsTool {
    retriever: Retriever,
    description: String,
}

impl RetrieveDocumentsTool {
    pub fn new(retriever: Retriever) -> Self {
        Self {
            retriever,
            description: "Search the indexed documentation for passages relevant to a question. \
                          Use it for questions the documentation can answer; do not use it for \
                          greetings, small talk or simple arithmetic."
                .to_string(),
        }
    }

    /// Override the description shown to the model, e.g. to name the corpus.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Tool for RetrieveDocumentsTool {
    fn name(&self) -> &str {
        "retrieve_documents"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema::new().required("query", ArgKind::String, "What to search the documentation for.")
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, AgentError> {
        let query = string_arg(self.name(), &arguments, "query")?;
        let result = self.retriever.query(query).await?;
        if result.is_empty() {
            return Ok(ToolOutput::text(NO_RESULTS));
        }

        tracing::debug!(query, hits = result.len(), "Documents retrieved");
        Ok(ToolOutput::text(Retriever::format_results(&result))
            .with_citations(Retriever::citations(&result)))
    }
}
