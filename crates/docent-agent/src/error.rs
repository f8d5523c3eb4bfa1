//! Error types for the agent orchestrator and tool registry.

use docent_core::error::DocentError;

use crate::state_machine::TurnState;

/// Errors from turns, tools and model calls.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("{0}")]
    ToolFailed(String),
    #[error("upstream call timed out after {after_ms} ms: {operation}")]
    UpstreamTimeout { operation: String, after_ms: u64 },
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("tool loop exceeded {limit} rounds")]
    ToolLoopExceeded { limit: usize },
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("not ready: {0}")]
    NotReady(String),
    #[error("invalid turn transition: {from} -> {to}")]
    InvalidTransition { from: TurnState, to: TurnState },
    #[error(transparent)]
    Core(DocentError),
}

impl AgentError {
    /// Whether retrying the same upstream call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::UpstreamTimeout { .. } | AgentError::UpstreamUnavailable(_)
        )
    }
}

impl From<DocentError> for AgentError {
    fn from(err: DocentError) -> Self {
        match err {
            DocentError::UpstreamTimeout {
                operation,
                after_ms,
            } => AgentError::UpstreamTimeout {
                operation,
                after_ms,
            },
            DocentError::UpstreamUnavailable(reason) => AgentError::UpstreamUnavailable(reason),
            other => AgentError::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::InvalidArguments {
            tool: "get_weather".to_string(),
            reason: "missing required argument 'city'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid arguments for get_weather: missing required argument 'city'"
        );

        let err = AgentError::UnknownTool("teleport".to_string());
        assert_eq!(err.to_string(), "unknown tool: teleport");

        let err = AgentError::ToolLoopExceeded { limit: 10 };
        assert_eq!(err.to_string(), "tool loop exceeded 10 rounds");

        let err = AgentError::EmptyMessage;
        assert_eq!(err.to_string(), "message cannot be empty");

        let err = AgentError::NotReady("no documents indexed".to_string());
        assert_eq!(err.to_string(), "not ready: no documents indexed");

        let err = AgentError::UpstreamUnavailable("503".to_string());
        assert_eq!(err.to_string(), "upstream unavailable: 503");
    }

    #[test]
    fn test_from_docent_error_keeps_upstream_kinds() {
        let err: AgentError = DocentError::UpstreamTimeout {
            operation: "embed".to_string(),
            after_ms: 30_000,
        }
        .into();
        assert!(matches!(err, AgentError::UpstreamTimeout { after_ms: 30_000, .. }));
        assert!(err.is_retryable());

        let err: AgentError = DocentError::UpstreamUnavailable("reset".to_string()).into();
        assert!(matches!(err, AgentError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_from_docent_error_wraps_others() {
        let err: AgentError = DocentError::DimensionMismatch {
            expected: 384,
            actual: 3,
        }
        .into();
        assert!(matches!(err, AgentError::Core(DocentError::DimensionMismatch { .. })));
        assert_eq!(err.to_string(), "Dimension mismatch: expected 384, got 3");
        assert!(!err.is_retryable());
    }
}
