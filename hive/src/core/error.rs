//! Error taxonomy for routing, tools, model invocation and runs.
//!
//! Recoverable errors ([`ToolError`], [`ModelError::Transport`]) are turned
//! into text for the model or into a per-peer [`TurnFailure`]. Only
//! [`HiveError`] ends a sweep.

use thiserror::Error;

use super::ids::AgentId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),
    #[error("no open chat between {from} and {to}")]
    NoChat { from: AgentId, to: AgentId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),
    #[error("a chat between {0} and {1} is already open")]
    AlreadyOpen(AgentId, AgentId),
    #[error("no open chat with {0}")]
    NotOpen(AgentId),
    #[error("the chat between {0} and {1} links a superior to a subordinate and cannot be closed")]
    ParentEdge(AgentId, AgentId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("agent id {0} is already registered")]
    Duplicate(AgentId),
    #[error("agent {0} is not registered")]
    Missing(AgentId),
}

/// Failures surfaced to the model as tool results. Never abort a turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool mistyped or unavailable: \"{0}\"")]
    Unavailable(String),
    #[error("Tool called with invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Error: Task {0} not found.")]
    TaskNotFound(AgentId),
    #[error("Error: you have no superior to message.")]
    NoSuperior,
    #[error("Error: no sandbox environment is available to you.")]
    NoSandbox,
    #[error("Error: {0}")]
    Route(#[from] RouteError),
    #[error("Error: {0}")]
    Chat(#[from] ChatError),
    #[error("Error: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Transient backend failure; the invocation may be retried.
    #[error("model transport failure: {0}")]
    Transport(String),
    /// The backend cannot be reached at all.
    #[error("model backend unavailable: {0}")]
    Unavailable(String),
    #[error("model invocation failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// A failed exchange with one peer. The rest of the turn and sweep continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnFailure {
    #[error("{agent} could not answer {peer}: {source}")]
    Model {
        agent: AgentId,
        peer: AgentId,
        source: ModelError,
    },
    #[error("{agent} could not deliver its reply to {peer}: {source}")]
    Routing {
        agent: AgentId,
        peer: AgentId,
        source: RouteError,
    },
}

/// Fatal to the run.
#[derive(Debug, Error)]
pub enum HiveError {
    #[error("registry corrupted: {0}")]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    ModelUnavailable(ModelError),
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_render_model_facing_text() {
        assert_eq!(
            ToolError::Unavailable("fly".to_string()).to_string(),
            "Tool mistyped or unavailable: \"fly\""
        );
        assert_eq!(
            ToolError::TaskNotFound(AgentId::new("1-abc")).to_string(),
            "Error: Task 1-abc not found."
        );
        let route = ToolError::from(RouteError::NoChat {
            from: AgentId::new("a"),
            to: AgentId::new("b"),
        });
        assert_eq!(route.to_string(), "Error: no open chat between a and b");
    }
}
