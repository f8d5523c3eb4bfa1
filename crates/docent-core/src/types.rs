use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{DocentError, Result};

/// Scalar metadata attached to sources and chunks (page, topic, offsets, ...).
///
/// A `BTreeMap` keeps rendering order stable, which keeps formatted
/// retrieval output deterministic.
pub type Metadata = BTreeMap<String, Value>;

// =============================================================================
// Retrieval
// =============================================================================

/// Raw text handed over by a document loader, before chunking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SourceDocument {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry that every chunk of this source inherits.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A bounded contiguous slice of source text prepared for embedding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_id: String,
    /// Position metadata (`chunk_index`, `start_char`, `end_char`) plus
    /// whatever the source carried.
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            metadata,
            embedding: None,
        }
    }

    /// Consume the chunk and return it with an embedding attached.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Render a metadata value as plain text (strings without quotes).
    pub fn metadata_text(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(scalar_to_text)
    }

    /// Index of the chunk within its source, if the chunker recorded it.
    pub fn chunk_index(&self) -> Option<u64> {
        self.metadata.get("chunk_index").and_then(Value::as_u64)
    }
}

/// Render a scalar JSON value for display.
pub fn scalar_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One ranked hit from a vector search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// 1-based rank.
    pub rank: usize,
    /// Cosine similarity between the query and the chunk.
    pub score: f64,
}

/// Ordered search results, best first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Assign 1-based ranks to already ordered `(chunk, score)` pairs.
    pub fn from_ranked(ranked: Vec<(Chunk, f64)>) -> Self {
        let hits = ranked
            .into_iter()
            .enumerate()
            .map(|(i, (chunk, score))| RetrievedChunk {
                chunk,
                rank: i + 1,
                score,
            })
            .collect();
        Self { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedChunk> {
        self.hits.iter()
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a RetrievedChunk;
    type IntoIter = std::slice::Iter<'a, RetrievedChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// How the vector index picks its results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SearchMode {
    /// Plain k-nearest-neighbours by cosine similarity.
    Similarity,
    /// Maximal marginal relevance over `fetch_k` candidates.
    ///
    /// `lambda = 1.0` is pure relevance, `lambda = 0.0` pure diversity.
    Diversity { fetch_k: usize, lambda: f64 },
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Similarity
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// A structured request from the model to invoke a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    /// Create a request with a freshly generated id.
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A model response: either tool requests, a final answer, or both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,
}

impl AssistantMessage {
    /// A final answer with no tool requests.
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_requests: Vec::new(),
        }
    }

    /// A response that only requests tools.
    pub fn tool_calls(tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            text: None,
            tool_requests,
        }
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }

    /// The answer text, or an empty string when the model sent none.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// A single entry of a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        text: String,
    },
    /// Injected at call time only; never part of a persisted thread.
    System {
        text: String,
    },
    Assistant(AssistantMessage),
    ToolResult {
        tool_request_id: String,
        result_text: String,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::User { text: text.into() }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Message::System { text: text.into() }
    }

    pub fn tool_result(tool_request_id: impl Into<String>, result_text: impl Into<String>) -> Self {
        Message::ToolResult {
            tool_request_id: tool_request_id.into(),
            result_text: result_text.into(),
        }
    }

    /// Role label as used in serialized form.
    pub fn role(&self) -> &'static str {
        match self {
            Message::User { .. } => "user",
            Message::System { .. } => "system",
            Message::Assistant(_) => "assistant",
            Message::ToolResult { .. } => "tool_result",
        }
    }
}

/// Ordered, append-only history of one conversation thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    pub thread_id: String,
    messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append one complete turn (user message through final answer).
    ///
    /// The turn is validated on its own before anything is appended, so a
    /// rejected turn leaves the thread untouched.
    pub fn append_turn(&mut self, turn: Vec<Message>) -> Result<()> {
        if !matches!(turn.first(), Some(Message::User { .. })) {
            return Err(DocentError::Storage(
                "a turn must start with a user message".to_string(),
            ));
        }
        validate_history(&turn)?;
        self.messages.extend(turn);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check the whole log, e.g. after loading it from disk.
    pub fn validate(&self) -> Result<()> {
        validate_history(&self.messages)
    }
}

/// Verify the tool-request pairing invariant of a message sequence.
///
/// Every assistant message with tool requests must be followed by exactly one
/// tool result per request id (in any order) before the next user or
/// assistant message. System messages are rejected outright.
pub fn validate_history(messages: &[Message]) -> Result<()> {
    let mut pending: HashSet<&str> = HashSet::new();

    for (position, message) in messages.iter().enumerate() {
        match message {
            Message::System { .. } => {
                return Err(corrupt(position, "system message in thread log"));
            }
            Message::User { .. } => {
                if !pending.is_empty() {
                    return Err(corrupt(position, "user message before pending tool results"));
                }
            }
            Message::Assistant(assistant) => {
                if !pending.is_empty() {
                    return Err(corrupt(
                        position,
                        "assistant message before pending tool results",
                    ));
                }
                for request in &assistant.tool_requests {
                    if !pending.insert(request.id.as_str()) {
                        return Err(corrupt(position, "duplicate tool request id"));
                    }
                }
            }
            Message::ToolResult {
                tool_request_id, ..
            } => {
                if !pending.remove(tool_request_id.as_str()) {
                    return Err(corrupt(position, "tool result without a matching request"));
                }
            }
        }
    }

    if pending.is_empty() {
        Ok(())
    } else {
        Err(corrupt(messages.len(), "unresolved tool requests at end of log"))
    }
}

fn corrupt(position: usize, reason: &str) -> DocentError {
    DocentError::Storage(format!("invalid message sequence at {}: {}", position, reason))
}
