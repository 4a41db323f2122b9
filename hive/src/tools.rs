//! Tool resolution: name lookup, schema validation and typed arguments.
//!
//! Every capability's argument schema is compiled once per run. A call is
//! resolved against the caller's capability set, validated, then
//! deserialized into an [`Action`] that [`crate::hive::Hive`] executes.

use std::collections::HashMap;

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::core::error::ToolError;
use crate::core::ids::AgentId;
use crate::core::role::Capability;
use crate::core::types::{TaskKind, ToolCall, ToolSpec};

/// A resolved, argument-checked tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum Action {
    MessagePeer {
        peer_id: AgentId,
        message: String,
    },
    ClosePeerChat {
        peer_id: AgentId,
    },
    MessageSuperior {
        message: String,
    },
    HireWorker {
        worker_label: String,
        task_description: String,
    },
    TerminateWorker {
        task_id: AgentId,
    },
    RunShellCommand {
        command: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    WriteToScratchpad {
        text: String,
    },
    SubmitWork {
        work_result: String,
    },
    SleepThroughTurn {},
    CreateTask {
        label: String,
        task: String,
        task_kind: TaskKind,
    },
    AcceptTaskResult {
        task_id: AgentId,
    },
    DenyTaskResult {
        task_id: AgentId,
        denial_reason: String,
    },
    TerminateTask {
        task_id: AgentId,
    },
    ApproveWork {
        worker_id: AgentId,
        #[serde(default)]
        optional_comment: Option<String>,
    },
    RequestChanges {
        worker_id: AgentId,
        requested_changes: String,
    },
    ApproveTask {
        requester_id: AgentId,
    },
    ModifyAndApproveTask {
        requester_id: AgentId,
        new_task: String,
        executor: TaskKind,
    },
    DenyTaskCreation {
        requester_id: AgentId,
        denial_reason: String,
    },
}

/// Compiled argument validators for every capability.
pub struct ToolBox {
    validators: HashMap<Capability, Validator>,
}

impl std::fmt::Debug for ToolBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBox")
            .field("tools", &self.validators.len())
            .finish()
    }
}

impl ToolBox {
    pub fn new() -> Result<Self> {
        let mut validators = HashMap::new();
        for capability in Capability::ALL {
            let validator = jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&capability.parameters())
                .with_context(|| format!("compile argument schema for {}", capability.name()))?;
            validators.insert(capability, validator);
        }
        Ok(Self { validators })
    }

    /// Tool schemas to bind for an agent, in capability order.
    pub fn specs(&self, capabilities: &[Capability]) -> Vec<ToolSpec> {
        capabilities.iter().map(|cap| cap.spec()).collect()
    }

    /// Resolve `call` against `permitted` and produce a typed action.
    pub fn resolve(&self, permitted: &[Capability], call: &ToolCall) -> Result<Action, ToolError> {
        let capability = Capability::from_name(&call.name)
            .filter(|cap| permitted.contains(cap))
            .ok_or_else(|| ToolError::Unavailable(call.name.clone()))?;

        let arguments = match &call.arguments {
            Value::Null => json!({}),
            other => other.clone(),
        };
        if let Some(validator) = self.validators.get(&capability) {
            let problems: Vec<String> = validator
                .iter_errors(&arguments)
                .map(|err| err.to_string())
                .collect();
            if !problems.is_empty() {
                return Err(ToolError::InvalidArguments(problems.join("; ")));
            }
        }

        serde_json::from_value(json!({ "name": capability.name(), "arguments": arguments }))
            .map_err(|err| ToolError::InvalidArguments(err.to_string()))
    }
}
