//! Agent orchestrator.
//!
//! Runs one user turn through the turn state machine: call the model with the
//! system prompt and thread history, dispatch any tool requests it makes, feed
//! the results back, and repeat until the model answers without requesting
//! tools. Messages produced during the turn are staged in a draft and only
//! committed to the thread when the turn reaches `Done`, so a failed or
//! abandoned turn leaves the thread exactly as it was.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use docent_core::config::{AgentConfig, DocentConfig, UpstreamConfig};
use docent_core::types::{AssistantMessage, Message, ThreadState, ToolRequest};

use crate::error::AgentError;
use crate::llm::{LanguageModel, ToolSpec};
use crate::prompt::TOOL_AGENT_PROMPT;
use crate::state_machine::{TurnState, TurnTracker};
use crate::store::ConversationStore;
use crate::tools::{ToolOutput, ToolRegistry};

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Text of the final assistant message.
    pub answer: String,
    /// Provenance collected from every tool the turn dispatched.
    pub citations: Vec<String>,
    /// States visited, starting with `AwaitingModel` and ending with `Done`.
    pub transitions: Vec<TurnState>,
    /// Number of tool dispatch rounds.
    pub tool_rounds: usize,
}

/// Drives user turns for every thread of a conversation store.
pub struct AgentOrchestrator {
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    store: Arc<dyn ConversationStore>,
    system_prompt: String,
    max_tool_rounds: usize,
    parallel_tool_calls: bool,
    model_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AgentOrchestrator {
    /// Orchestrator with the default agent and upstream settings and the
    /// general tool-agent prompt.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: ToolRegistry,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let agent = AgentConfig::default();
        let upstream = UpstreamConfig::default();
        Self {
            model,
            tools,
            store,
            system_prompt: TOOL_AGENT_PROMPT.to_string(),
            max_tool_rounds: agent.max_tool_rounds,
            parallel_tool_calls: agent.parallel_tool_calls,
            model_timeout: Duration::from_secs(upstream.model_timeout_secs),
            max_retries: upstream.max_retries,
            retry_backoff: Duration::from_millis(upstream.retry_backoff_ms),
        }
    }

    /// Orchestrator configured from the `agent` and `upstream` sections.
    pub fn from_config(
        config: &DocentConfig,
        model: Arc<dyn LanguageModel>,
        tools: ToolRegistry,
        store: Arc<dyn ConversationStore>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        Ok(Self::new(model, tools, store)
            .with_max_tool_rounds(config.agent.max_tool_rounds)
            .with_parallel_tool_calls(config.agent.parallel_tool_calls)
            .with_model_timeout(Duration::from_secs(config.upstream.model_timeout_secs))
            .with_retry(
                config.upstream.max_retries,
                Duration::from_millis(config.upstream.retry_backoff_ms),
            ))
    }

    /// Replace the system prompt. An empty prompt sends none.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Retry retryable model failures `max_retries` times, sleeping
    /// `backoff`, `2 * backoff`, `4 * backoff`, ... in between.
    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    /// Run one user turn on `thread_id`.
    ///
    /// Turns on the same thread are serialised by the thread lock. The thread
    /// is only modified when the turn completes; on any error it is left
    /// untouched.
    pub async fn handle_turn(
        &self,
        thread_id: &str,
        user_text: &str,
    ) -> Result<TurnOutcome, AgentError> {
        if user_text.trim().is_empty() {
            return Err(AgentError::EmptyMessage);
        }

        let handle = self.store.open(thread_id).await?;
        let mut thread = handle.lock().await;

        let specs = self.tools.specs();
        let mut tracker = TurnTracker::new();
        let mut draft = vec![Message::user(user_text)];
        let mut citations = Vec::new();
        let mut tool_rounds = 0;

        debug!(thread_id, history = thread.len(), "Turn started");

        loop {
            let history = self.compose(&thread, &draft);
            let response = self.call_model(&history, &specs).await?;

            if !response.has_tool_requests() {
                tracker.advance(TurnState::Done)?;
                let answer = response.text_or_empty().to_string();
                draft.push(Message::Assistant(response));

                let mut committed = thread.clone();
                committed.append_turn(draft)?;
                self.store.persist(&committed).await?;
                *thread = committed;

                info!(
                    thread_id,
                    tool_rounds,
                    citations = citations.len(),
                    "Turn completed"
                );
                return Ok(TurnOutcome {
                    answer,
                    citations,
                    transitions: tracker.into_visited(),
                    tool_rounds,
                });
            }

            if tool_rounds >= self.max_tool_rounds {
                warn!(
                    thread_id,
                    limit = self.max_tool_rounds,
                    "Model kept requesting tools, abandoning turn"
                );
                return Err(AgentError::ToolLoopExceeded {
                    limit: self.max_tool_rounds,
                });
            }

            tracker.advance(TurnState::DispatchingTools)?;
            tool_rounds += 1;

            let requests = response.tool_requests.clone();
            draft.push(Message::Assistant(response));

            let outputs = self.dispatch_round(&requests).await;
            for (request, output) in requests.iter().zip(outputs) {
                citations.extend(output.citations);
                draft.push(Message::tool_result(request.id.clone(), output.content));
            }

            tracker.advance(TurnState::AwaitingModel)?;
        }
    }

    /// System prompt, persisted history, then the messages of this turn.
    fn compose(&self, thread: &ThreadState, draft: &[Message]) -> Vec<Message> {
        let mut history = Vec::with_capacity(thread.len() + draft.len() + 1);
        if !self.system_prompt.is_empty() {
            history.push(Message::system(self.system_prompt.clone()));
        }
        history.extend_from_slice(thread.messages());
        history.extend_from_slice(draft);
        history
    }

    async fn call_model(
        &self,
        messages: &[Message],
        specs: &[ToolSpec],
    ) -> Result<AssistantMessage, AgentError> {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(
                self.model_timeout,
                self.model.complete(messages, specs),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AgentError::UpstreamTimeout {
                    operation: "model completion".to_string(),
                    after_ms: self.model_timeout.as_millis() as u64,
                }),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt));
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Run every request of one round. Outputs come back in request order.
    async fn dispatch_round(&self, requests: &[ToolRequest]) -> Vec<ToolOutput> {
        if !self.parallel_tool_calls || requests.len() < 2 {
            let mut outputs = Vec::with_capacity(requests.len());
            for request in requests {
                let result = self
                    .tools
                    .dispatch(&request.tool_name, request.arguments.clone())
                    .await;
                outputs.push(into_output(request, result));
            }
            return outputs;
        }

        let mut set = JoinSet::new();
        for (position, request) in requests.iter().enumerate() {
            let tools = self.tools.clone();
            let name = request.tool_name.clone();
            let arguments = request.arguments.clone();
            set.spawn(async move { (position, tools.dispatch(&name, arguments).await) });
        }

        let mut slots: Vec<Option<ToolOutput>> = (0..requests.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((position, result)) => {
                    slots[position] = Some(into_output(&requests[position], result));
                }
                Err(err) => warn!(error = %err, "Tool dispatch task did not complete"),
            }
        }

        requests
            .iter()
            .zip(slots)
            .map(|(request, slot)| {
                slot.unwrap_or_else(|| {
                    ToolOutput::text(format!(
                        "Error performing {}: dispatch did not complete",
                        request.tool_name
                    ))
                })
            })
            .collect()
    }
}

/// Unknown tools and invalid arguments go back to the model as result text.
fn into_output(request: &ToolRequest, result: Result<ToolOutput, AgentError>) -> ToolOutput {
    match result {
        Ok(output) => output,
        Err(err) => {
            warn!(tool = %request.tool_name, request_id = %request.id, error = %err, "Tool request rejected");
            ToolOutput::text(format!("Error: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::store::InMemoryConversationStore;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn orchestrator(model: ScriptedModel) -> (AgentOrchestrator, Arc<ScriptedModel>) {
        let model = Arc::new(model);
        let mut tools = ToolRegistry::new();
        tools.register_defaults();
        let store = Arc::new(InMemoryConversationStore::new());
        (
            AgentOrchestrator::new(model.clone(), tools, store).with_retry(2, Duration::from_millis(1)),
            model,
        )
    }

    async fn thread(orchestrator: &AgentOrchestrator, id: &str) -> ThreadState {
        orchestrator.store().snapshot(id).await.unwrap().unwrap_or_else(|| ThreadState::new(id))
    }

    // =====================================================================
    // Direct answers
    // =====================================================================

    #[tokio::test]
    async fn test_direct_answer() {
        let (orchestrator, model) =
            orchestrator(ScriptedModel::new(vec![AssistantMessage::answer("Hello!")]));

        let outcome = orchestrator.handle_turn("t1", "hi").await.unwrap();
        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(outcome.tool_rounds, 0);
        assert_eq!(outcome.transitions, vec![TurnState::AwaitingModel, TurnState::Done]);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], Message::system(TOOL_AGENT_PROMPT));
        assert_eq!(calls[0][1], Message::user("hi"));

        let state = thread(&orchestrator, "t1").await;
        assert_eq!(state.len(), 2);
        assert!(state.messages().iter().all(|m| !matches!(m, Message::System { .. })));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (orchestrator, model) = orchestrator(ScriptedModel::new(Vec::new()));
        let err = orchestrator.handle_turn("t1", "  \n").await.unwrap_err();
        assert!(matches!(err, AgentError::EmptyMessage));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_history_carries_across_turns() {
        let (orchestrator, model) = orchestrator(ScriptedModel::new(vec![
            AssistantMessage::answer("Nice to meet you, Ada."),
            AssistantMessage::answer("Your name is Ada."),
        ]));

        orchestrator.handle_turn("t1", "I am Ada").await.unwrap();
        orchestrator.handle_turn("t1", "What is my name?").await.unwrap();

        let second_call = &model.calls()[1];
        assert_eq!(second_call.len(), 4);
        assert_eq!(second_call[1], Message::user("I am Ada"));
        assert_eq!(second_call[3], Message::user("What is my name?"));
    }

    // =====================================================================
    // Tool rounds
    // =====================================================================

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let request = ToolRequest::new("get_weather", args(json!({"city": "london"}))).with_id("call_1");
        let (orchestrator, model) = orchestrator(ScriptedModel::new(vec![
            AssistantMessage::tool_calls(vec![request]),
            AssistantMessage::answer("It is rainy in London."),
        ]));

        let outcome = orchestrator.handle_turn("t1", "Weather in London?").await.unwrap();
        assert_eq!(outcome.tool_rounds, 1);
        assert_eq!(outcome.answer, "It is rainy in London.");

        let second_call = &model.calls()[1];
        assert_eq!(
            second_call.last().unwrap(),
            &Message::tool_result("call_1", "Current weather in London: Rainy, 12°C, chance of rain: 80%")
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_result_text() {
        let request = ToolRequest::new("teleport", Map::new()).with_id("call_x");
        let (orchestrator, _model) = orchestrator(ScriptedModel::new(vec![
            AssistantMessage::tool_calls(vec![request]),
            AssistantMessage::answer("I cannot teleport."),
        ]));

        orchestrator.handle_turn("t1", "teleport me").await.unwrap();
        let state = thread(&orchestrator, "t1").await;
        assert_eq!(
            state.messages()[2],
            Message::tool_result("call_x", "Error: unknown tool: teleport")
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_become_result_text() {
        let request = ToolRequest::new("lookup_word", args(json!({"term": "verbose"}))).with_id("call_1");
        let (orchestrator, _model) = orchestrator(ScriptedModel::new(vec![
            AssistantMessage::tool_calls(vec![request]),
            AssistantMessage::answer("Let me try again later."),
        ]));

        orchestrator.handle_turn("t1", "define verbose").await.unwrap();
        let state = thread(&orchestrator, "t1").await;
        assert_eq!(
            state.messages()[2],
            Message::tool_result(
                "call_1",
                "Error: invalid arguments for lookup_word: missing required argument 'word'"
            )
        );
    }

    #[tokio::test]
    async fn test_loop_cap_leaves_thread_unchanged() {
        let always_tool = (0..5).map(|i| {
            AssistantMessage::tool_calls(vec![ToolRequest::new(
                "lookup_word",
                args(json!({"word": "verbose"})),
            )
            .with_id(format!("call_{}", i))])
        });
        let (orchestrator, model) = orchestrator(ScriptedModel::new(always_tool));
        let orchestrator = orchestrator.with_max_tool_rounds(3);

        let err = orchestrator.handle_turn("t1", "loop forever").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolLoopExceeded { limit: 3 }));
        assert_eq!(model.call_count(), 4);
        assert!(thread(&orchestrator, "t1").await.is_empty());
    }

    // =====================================================================
    // Upstream failures
    // =====================================================================

    #[tokio::test]
    async fn test_transient_model_failure_is_retried() {
        let (orchestrator, model) = orchestrator(
            ScriptedModel::new(vec![AssistantMessage::answer("recovered")]).fail_next("503"),
        );
        let outcome = orchestrator.handle_turn("t1", "hi").await.unwrap();
        assert_eq!(outcome.answer, "recovered");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_turn() {
        let (orchestrator, model) = orchestrator(ScriptedModel::new(Vec::new()));
        let err = orchestrator.handle_turn("t1", "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::UpstreamUnavailable(_)));
        assert_eq!(model.call_count(), 3);
        assert!(thread(&orchestrator, "t1").await.is_empty());
    }

    struct StalledModel;

    #[async_trait]
    impl LanguageModel for StalledModel {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolSpec],
        ) -> Result<AssistantMessage, AgentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(AssistantMessage::answer("too late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout() {
        let orchestrator = AgentOrchestrator::new(
            Arc::new(StalledModel),
            ToolRegistry::new(),
            Arc::new(InMemoryConversationStore::new()),
        )
        .with_model_timeout(Duration::from_secs(5))
        .with_retry(1, Duration::from_millis(10));

        let err = orchestrator.handle_turn("t1", "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::UpstreamTimeout { after_ms: 5000, .. }));
    }

    #[test]
    fn test_from_config_rejects_invalid_settings() {
        let mut config = DocentConfig::default();
        config.agent.max_tool_rounds = 0;
        let result = AgentOrchestrator::from_config(
            &config,
            Arc::new(ScriptedModel::new(Vec::new())),
            ToolRegistry::new(),
            Arc::new(InMemoryConversationStore::new()),
        );
        assert!(matches!(
            result,
            Err(AgentError::Core(docent_core::DocentError::InvalidConfiguration(_)))
        ));
    }
}
