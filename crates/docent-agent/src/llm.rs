//! Language model capability.
//!
//! The orchestrator talks to any chat model through [`LanguageModel`]: given
//! the conversation so far and the tools on offer, produce one assistant
//! message. Provider clients live outside this crate.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use docent_core::types::{AssistantMessage, Message};

use crate::error::AgentError;

/// Tool description handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub input_schema: Value,
}

/// A chat model that may answer directly or request tool calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the next assistant message for `messages`.
    ///
    /// `tools` is empty when the caller wants a plain completion.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<AssistantMessage, AgentError>;
}

/// Model that replays a fixed script of responses, for tests and demos.
///
/// Every call pops the next response and records the messages it was given.
/// An exhausted script reports `UpstreamUnavailable`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<AssistantMessage, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = AssistantMessage>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a transient failure before the remaining responses.
    pub fn fail_next(self, reason: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_front(Err(reason.into()));
        }
        self
    }

    /// Append a response to the end of the script.
    pub fn push(&self, response: AssistantMessage) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(response));
        }
    }

    /// Messages passed to each call so far.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<AssistantMessage, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .script
            .lock()
            .map_err(|e| AgentError::UpstreamUnavailable(format!("script lock poisoned: {}", e)))?
            .pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(AgentError::UpstreamUnavailable(reason)),
            None => Err(AgentError::UpstreamUnavailable(
                "scripted model has no responses left".to_string(),
            )),
        }
    }
}
