pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod rag;
pub mod state_machine;
pub mod store;
pub mod tools;

pub use error::AgentError;
pub use llm::{LanguageModel, ScriptedModel, ToolSpec};
pub use orchestrator::{AgentOrchestrator, TurnOutcome};
pub use rag::{RagAnswer, RagChain};
pub use state_machine::{validate_transition, TurnState, TurnTracker};
pub use store::{
    store_from_config, ConversationStore, FileConversationStore, InMemoryConversationStore,
    ThreadHandle,
};
pub use tools::{Tool, ToolOutput, ToolRegistry};
