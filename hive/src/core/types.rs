//! Shared types crossing the model-invocation boundary.
//!
//! These are the wire shapes exchanged with a model backend: the prompt
//! messages and tool schemas going in, the free text and tool calls coming
//! back. They serialize to JSON so out-of-process backends can consume them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::AgentId;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(alias = "id")]
    pub correlation_id: String,
    pub name: String,
    #[serde(default, alias = "args")]
    pub arguments: Value,
}

/// Outcome of one tool invocation, paired with its call by `correlation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub correlation_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

/// Tool schema advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One typed message of a rendered prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum PromptMessage {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        correlation_id: String,
        content: String,
    },
}

/// Everything a backend needs for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Agent whose turn produced the request.
    pub agent_id: AgentId,
    /// Peer whose chat is being answered.
    pub peer_id: AgentId,
    pub messages: Vec<PromptMessage>,
    pub tools: Vec<ToolSpec>,
}

/// Backend reply: free text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls,
        }
    }

    /// Free text worth routing: present and not just whitespace.
    pub fn routable_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Kind of child a manager spawns for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Needs further planning; handled by a manager.
    #[serde(alias = "manager")]
    Abstract,
    /// Directly executable; handled by a worker.
    #[serde(alias = "worker")]
    Technical,
}

impl TaskKind {
    pub fn executor_label(self) -> &'static str {
        match self {
            TaskKind::Abstract => "manager",
            TaskKind::Technical => "worker",
        }
    }
}
