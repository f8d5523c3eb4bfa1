//! Turn state machine with validated transitions.
//!
//! Every user turn runs through:
//! AwaitingModel -> DispatchingTools -> AwaitingModel -> ... -> Done
//!
//! The model alone decides the branch: a response with tool requests moves to
//! DispatchingTools, a response without them ends the turn.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Phase of a single user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Waiting for the language model to respond to the current history.
    AwaitingModel,
    /// Executing the tool requests of the last assistant message.
    DispatchingTools,
    /// The model produced a final answer.
    Done,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TurnState::AwaitingModel => "AwaitingModel",
            TurnState::DispatchingTools => "DispatchingTools",
            TurnState::Done => "Done",
        };
        f.write_str(name)
    }
}

/// Validate that a state transition is allowed.
///
/// Valid transitions:
/// - AwaitingModel -> DispatchingTools
/// - DispatchingTools -> AwaitingModel
/// - AwaitingModel -> Done
pub fn validate_transition(from: TurnState, to: TurnState) -> Result<(), AgentError> {
    let valid = matches!(
        (from, to),
        (TurnState::AwaitingModel, TurnState::DispatchingTools)
            | (TurnState::DispatchingTools, TurnState::AwaitingModel)
            | (TurnState::AwaitingModel, TurnState::Done)
    );

    if valid {
        Ok(())
    } else {
        Err(AgentError::InvalidTransition { from, to })
    }
}

/// Records the states a turn passes through, rejecting illegal moves.
#[derive(Debug, Clone)]
pub struct TurnTracker {
    current: TurnState,
    visited: Vec<TurnState>,
}

impl TurnTracker {
    /// Start a turn in `AwaitingModel`.
    pub fn new() -> Self {
        Self {
            current: TurnState::AwaitingModel,
            visited: vec![TurnState::AwaitingModel],
        }
    }

    pub fn current(&self) -> TurnState {
        self.current
    }

    pub fn advance(&mut self, to: TurnState) -> Result<(), AgentError> {
        validate_transition(self.current, to)?;
        tracing::debug!(from = %self.current, to = %to, "Turn transition");
        self.current = to;
        self.visited.push(to);
        Ok(())
    }

    /// All states visited so far, starting with `AwaitingModel`.
    pub fn into_visited(self) -> Vec<TurnState> {
        self.visited
    }
}

impl Default for TurnTracker {
    fn default() -> Self {
        Self::new()
    }
}
