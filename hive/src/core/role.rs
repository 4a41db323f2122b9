//! Roles and the capability table.
//!
//! A role is a tag plus an ordered capability list. Everything that differs
//! between roles (which tools are bound, whether children are visited,
//! whether a sandbox is allocated) is a pure function of the tag.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::types::ToolSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Leaf-or-composite agent that can both hire and do technical work.
    General,
    /// Pure dispatcher.
    Manager,
    /// Technical leaf.
    Worker,
    /// Quality gate ahead of a manager accepting a result.
    Verifier,
    /// Governance gate on task creation.
    Overseer,
    /// The driver's endpoint. Holds chats but never takes a turn.
    External,
}

/// Capabilities every scheduled role carries, in order.
const UNIVERSAL: &[Capability] = &[
    Capability::MessagePeer,
    Capability::ClosePeerChat,
    Capability::MessageSuperior,
];

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::General => "general",
            Role::Manager => "manager",
            Role::Worker => "worker",
            Role::Verifier => "verifier",
            Role::Overseer => "overseer",
            Role::External => "external",
        }
    }

    fn own_capabilities(self) -> &'static [Capability] {
        match self {
            Role::General => &[
                Capability::HireWorker,
                Capability::TerminateWorker,
                Capability::RunShellCommand,
                Capability::WriteToScratchpad,
                Capability::SubmitWork,
                Capability::SleepThroughTurn,
            ],
            Role::Manager => &[
                Capability::CreateTask,
                Capability::AcceptTaskResult,
                Capability::DenyTaskResult,
                Capability::TerminateTask,
            ],
            Role::Worker => &[
                Capability::SubmitWork,
                Capability::RunShellCommand,
                Capability::WriteToScratchpad,
            ],
            Role::Verifier => &[Capability::ApproveWork, Capability::RequestChanges],
            Role::Overseer => &[
                Capability::ApproveTask,
                Capability::ModifyAndApproveTask,
                Capability::DenyTaskCreation,
            ],
            Role::External => &[],
        }
    }

    /// Ordered capability set: universal capabilities first, then the role's own.
    pub fn capabilities(self) -> Vec<Capability> {
        if !self.is_scheduled() {
            return Vec::new();
        }
        let mut caps = UNIVERSAL.to_vec();
        caps.extend_from_slice(self.own_capabilities());
        caps
    }

    /// Whether the scheduler descends into this role's children.
    pub fn visits_children(self) -> bool {
        matches!(self, Role::General | Role::Manager)
    }

    /// Whether agents of this role may have children attached.
    pub fn accepts_children(self) -> bool {
        self.visits_children()
    }

    pub fn has_sandbox(self) -> bool {
        matches!(self, Role::General | Role::Worker)
    }

    pub fn is_scheduled(self) -> bool {
        self != Role::External
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named action an agent may ask its model to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    MessagePeer,
    ClosePeerChat,
    MessageSuperior,
    HireWorker,
    TerminateWorker,
    RunShellCommand,
    WriteToScratchpad,
    SubmitWork,
    SleepThroughTurn,
    CreateTask,
    AcceptTaskResult,
    DenyTaskResult,
    TerminateTask,
    ApproveWork,
    RequestChanges,
    ApproveTask,
    ModifyAndApproveTask,
    DenyTaskCreation,
}

impl Capability {
    pub const ALL: [Capability; 18] = [
        Capability::MessagePeer,
        Capability::ClosePeerChat,
        Capability::MessageSuperior,
        Capability::HireWorker,
        Capability::TerminateWorker,
        Capability::RunShellCommand,
        Capability::WriteToScratchpad,
        Capability::SubmitWork,
        Capability::SleepThroughTurn,
        Capability::CreateTask,
        Capability::AcceptTaskResult,
        Capability::DenyTaskResult,
        Capability::TerminateTask,
        Capability::ApproveWork,
        Capability::RequestChanges,
        Capability::ApproveTask,
        Capability::ModifyAndApproveTask,
        Capability::DenyTaskCreation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::MessagePeer => "message_peer",
            Capability::ClosePeerChat => "close_peer_chat",
            Capability::MessageSuperior => "message_superior",
            Capability::HireWorker => "hire_worker",
            Capability::TerminateWorker => "terminate_worker",
            Capability::RunShellCommand => "run_shell_command",
            Capability::WriteToScratchpad => "write_to_scratchpad",
            Capability::SubmitWork => "submit_work",
            Capability::SleepThroughTurn => "sleep_through_turn",
            Capability::CreateTask => "create_task",
            Capability::AcceptTaskResult => "accept_task_result",
            Capability::DenyTaskResult => "deny_task_result",
            Capability::TerminateTask => "terminate_task",
            Capability::ApproveWork => "approve_work",
            Capability::RequestChanges => "request_changes",
            Capability::ApproveTask => "approve_task",
            Capability::ModifyAndApproveTask => "modify_and_approve_task",
            Capability::DenyTaskCreation => "deny_task_creation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Capability::MessagePeer => "Sends a message in one of your open chats.",
            Capability::ClosePeerChat => {
                "Closes a peer chat once its question has been resolved. Chats with your superior or your workers cannot be closed."
            }
            Capability::MessageSuperior => "Sends a message to your superior.",
            Capability::HireWorker => {
                "Hires a sub-contractor with a descriptive label and a self-contained task description. The task is sent to them as their first message."
            }
            Capability::TerminateWorker => {
                "Dismisses one of your workers, whether their task is finished or still executing."
            }
            Capability::RunShellCommand => {
                "Runs a shell command in your sandbox and returns its combined output."
            }
            Capability::WriteToScratchpad => {
                "Writes a short note to your scratchpad. Notes are shown to you on every turn."
            }
            Capability::SubmitWork => {
                "Submits your finished work to your superior for evaluation."
            }
            Capability::SleepThroughTurn => {
                "Does nothing this turn. Use it when you are waiting on others."
            }
            Capability::CreateTask => {
                "Schedules creation and execution of a task. Abstract tasks go to a manager, technical tasks to a worker."
            }
            Capability::AcceptTaskResult => {
                "Approves a task's result and closes the task once the work is high quality and working well."
            }
            Capability::DenyTaskResult => {
                "Denies the work submitted for a task and tells the worker why. The task stays open."
            }
            Capability::TerminateTask => {
                "Stops a task, whether it is finished or still executing."
            }
            Capability::ApproveWork => {
                "Approves a worker's result once it is high quality and working well."
            }
            Capability::RequestChanges => {
                "Reports the issues found in a worker's result and requests their improvement."
            }
            Capability::ApproveTask => "Approves the creation of the requested task.",
            Capability::ModifyAndApproveTask => {
                "Modifies the requested task and approves it. Ask the requester before making changes."
            }
            Capability::DenyTaskCreation => {
                "Denies creation of the requested task. Discuss the reasoning with the requester first."
            }
        }
    }

    /// JSON Schema (Draft 2020-12) of the capability's arguments.
    pub fn parameters(self) -> Value {
        match self {
            Capability::MessagePeer => object_schema(&[
                ("peer_id", string_prop("Id of the agent to message.")),
                ("message", string_prop("Message text.")),
            ]),
            Capability::ClosePeerChat | Capability::TerminateWorker => {
                let (key, desc) = if self == Capability::ClosePeerChat {
                    ("peer_id", "Id of the peer whose chat to close.")
                } else {
                    ("task_id", "Id of the worker to dismiss.")
                };
                object_schema(&[(key, string_prop(desc))])
            }
            Capability::MessageSuperior => {
                object_schema(&[("message", string_prop("Message text."))])
            }
            Capability::HireWorker => object_schema(&[
                (
                    "worker_label",
                    string_prop("Descriptive label, e.g. Backend Engineer."),
                ),
                (
                    "task_description",
                    string_prop("Goal and all context the worker needs."),
                ),
            ]),
            Capability::RunShellCommand => json!({
                "type": "object",
                "properties": {
                    "command": string_prop("Shell command text."),
                    "timeout_secs": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Optional timeout override in seconds."
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
            Capability::WriteToScratchpad => {
                object_schema(&[("text", string_prop("Note text."))])
            }
            Capability::SubmitWork => {
                object_schema(&[("work_result", string_prop("Description of the finished work."))])
            }
            Capability::SleepThroughTurn => object_schema(&[]),
            Capability::CreateTask => object_schema(&[
                ("label", string_prop("Descriptive label for the assignee.")),
                ("task", string_prop("Self-contained task description.")),
                (
                    "task_kind",
                    json!({"type": "string", "enum": ["abstract", "technical"]}),
                ),
            ]),
            Capability::AcceptTaskResult | Capability::TerminateTask => {
                object_schema(&[("task_id", string_prop("Id of the task."))])
            }
            Capability::DenyTaskResult => object_schema(&[
                ("task_id", string_prop("Id of the task.")),
                ("denial_reason", string_prop("Why the result was denied.")),
            ]),
            Capability::ApproveWork => json!({
                "type": "object",
                "properties": {
                    "worker_id": string_prop("Id of the worker whose result is approved."),
                    "optional_comment": string_prop("Optional remarks.")
                },
                "required": ["worker_id"],
                "additionalProperties": false
            }),
            Capability::RequestChanges => object_schema(&[
                ("worker_id", string_prop("Id of the worker.")),
                ("requested_changes", string_prop("Issues to fix.")),
            ]),
            Capability::ApproveTask => {
                object_schema(&[("requester_id", string_prop("Id of the requester."))])
            }
            Capability::ModifyAndApproveTask => object_schema(&[
                ("requester_id", string_prop("Id of the requester.")),
                ("new_task", string_prop("The modified task description.")),
                (
                    "executor",
                    json!({"type": "string", "enum": ["worker", "manager"]}),
                ),
            ]),
            Capability::DenyTaskCreation => object_schema(&[
                ("requester_id", string_prop("Id of the requester.")),
                ("denial_reason", string_prop("Why the task was denied.")),
            ]),
        }
    }

    pub fn spec(self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

fn string_prop(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

/// Object schema where every listed property is required.
fn object_schema(props: &[(&str, Value)]) -> Value {
    let properties: serde_json::Map<String, Value> = props
        .iter()
        .map(|(key, schema)| ((*key).to_string(), schema.clone()))
        .collect();
    let required: Vec<&str> = props.iter().map(|(key, _)| *key).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}
