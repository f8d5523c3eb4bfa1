//! Tool registry and trait definition.
//!
//! Defines the `Tool` async trait, the argument schema every tool declares,
//! and the registry the orchestrator dispatches tool requests through.

pub mod dictionary;
pub mod retrieval;
pub mod weather;
pub mod web_search;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::llm::ToolSpec;

pub use dictionary::LookupWordTool;
pub use retrieval::RetrieveDocumentsTool;
pub use weather::GetWeatherTool;
pub use web_search::{WebSearchBackend, WebSearchHit, WebSearchTool};

/// JSON type accepted for one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ArgKind {
    fn json_type(self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Number => "number",
            ArgKind::Boolean => "boolean",
            ArgKind::Array => "array",
            ArgKind::Object => "object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ArgKind::String => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Number => value.is_number(),
            ArgKind::Boolean => value.is_boolean(),
            ArgKind::Array => value.is_array(),
            ArgKind::Object => value.is_object(),
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub description: String,
    pub required: bool,
}

/// Declared arguments of a tool. Undeclared arguments are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSchema {
    args: Vec<ArgSpec>,
}

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: ArgKind, description: &str) -> Self {
        self.args.push(ArgSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: ArgKind, description: &str) -> Self {
        self.args.push(ArgSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
        });
        self
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    /// Check `arguments` against the declared arguments of `tool`.
    pub fn validate(&self, tool: &str, arguments: &Map<String, Value>) -> Result<(), AgentError> {
        let invalid = |reason: String| AgentError::InvalidArguments {
            tool: tool.to_string(),
            reason,
        };

        for spec in &self.args {
            match arguments.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(invalid(format!("missing required argument '{}'", spec.name)));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.matches(value) => {
                    return Err(invalid(format!(
                        "argument '{}' must be of type {}",
                        spec.name,
                        spec.kind.json_type()
                    )));
                }
                Some(_) => {}
            }
        }

        if let Some(extra) = arguments
            .keys()
            .find(|key| !self.args.iter().any(|spec| &spec.name == *key))
        {
            return Err(invalid(format!("unexpected argument '{}'", extra)));
        }

        Ok(())
    }

    /// Render as a JSON Schema object for the model.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    json!({
                        "type": spec.kind.json_type(),
                        "description": spec.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// What a tool hands back to the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text placed into the tool result message.
    pub content: String,
    /// Provenance strings for the final answer.
    #[serde(default)]
    pub citations: Vec<String>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            citations: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<String>) -> Self {
        self.citations = citations;
        self
    }
}

/// A named capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> ArgumentSchema;

    /// Run the tool with already validated arguments.
    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, AgentError>;
}

/// Registry mapping tool names to their implementations.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the self-contained tools: `get_weather` and `lookup_word`.
    pub fn register_defaults(&mut self) {
        self.register(Arc::new(GetWeatherTool));
        self.register(Arc::new(LookupWordTool));
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.insert(tool.name().to_string(), tool)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool descriptions for the model, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.schema().to_json_schema(),
            })
            .collect()
    }

    /// Validate and run one tool request.
    ///
    /// Unknown tools and invalid arguments are errors. Anything that goes
    /// wrong inside the tool, a panic included, becomes the content
    /// `Error performing <tool>: <reason>` so the model can react to it.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolOutput, AgentError> {
        let tool = self
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;
        tool.schema().validate(tool_name, &arguments)?;

        debug!(tool = tool_name, "Dispatching tool");
        let mut task = AbortOnDrop(tokio::spawn(async move { tool.call(arguments).await }));

        let reason = match (&mut task.0).await {
            Ok(Ok(output)) => return Ok(output),
            Ok(Err(err)) => err.to_string(),
            Err(join_err) if join_err.is_panic() => {
                format!("tool panicked: {}", panic_message(join_err.into_panic()))
            }
            Err(join_err) => join_err.to_string(),
        };

        warn!(tool = tool_name, reason = %reason, "Tool failed");
        Ok(ToolOutput::text(format!(
            "Error performing {}: {}",
            tool_name, reason
        )))
    }
}

/// Aborts the spawned tool call if the dispatching future is dropped first.
struct AbortOnDrop<T>(tokio::task::JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Fetch a string argument that the schema already marked as required.
pub(crate) fn string_arg<'a>(
    tool: &str,
    arguments: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a str, AgentError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::InvalidArguments {
            tool: tool.to_string(),
            reason: format!("missing required argument '{}'", name),
        })
}
