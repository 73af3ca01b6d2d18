//! Error types for agent orchestration

use thiserror::Error;
use tower::BoxError;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Main error type for orchestration runs
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The starting agent, or a handoff target, is not registered
    #[error("Agent not found: {name}")]
    AgentNotFound { name: String },

    /// The step budget was spent without reaching a turn that did not hand off
    #[error("Maximum total turns exceeded: {consumed} of {max_turns}")]
    TurnLimitExceeded { max_turns: usize, consumed: usize },

    /// The agent's model call (or one of its tools) failed during a turn
    #[error("Agent '{agent}' failed on turn {turn}: {source}")]
    AgentExecution {
        agent: String,
        turn: usize,
        #[source]
        source: BoxError,
    },

    /// The caller cancelled the run
    #[error("Run cancelled while '{agent}' was on turn {turn}")]
    Cancelled { agent: String, turn: usize },

    /// A declared handoff cannot be resolved against the registry
    #[error("Invalid handoff graph: {message}")]
    InvalidHandoffGraph { message: String },

    /// The run task went away before resolving its result
    #[error("Run aborted before producing a result")]
    Aborted,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestratorError {
    /// True for the two fatal loop exits a caller usually wants to tell apart:
    /// a runaway handoff loop as opposed to a misconfigured graph.
    pub fn is_turn_limit(&self) -> bool {
        matches!(self, Self::TurnLimitExceeded { .. })
    }

    pub fn is_agent_not_found(&self) -> bool {
        matches!(self, Self::AgentNotFound { .. })
    }
}
