//! Capability handlers.
//!
//! Each handler returns the text shown to the model as the tool result.
//! Handlers never panic on bad input; unknown ids and closed chats come back
//! as [`ToolError`]s.

use std::time::Duration;

use tracing::info;

use super::Hive;
use crate::core::error::ToolError;
use crate::core::ids::AgentId;
use crate::core::role::Role;
use crate::core::types::TaskKind;
use crate::io::model::Model;
use crate::tools::Action;

impl<M: Model> Hive<M> {
    pub(crate) fn perform(&mut self, id: &AgentId, action: Action) -> Result<String, ToolError> {
        match action {
            Action::MessagePeer { peer_id, message } => {
                self.registry.route(id, &peer_id, &message)?;
                Ok(format!("Message sent to {peer_id}."))
            }
            Action::ClosePeerChat { peer_id } => {
                self.registry.close_chat(id, &peer_id)?;
                Ok(format!("Chat with {peer_id} closed."))
            }
            Action::MessageSuperior { message } => {
                let parent = self.superior_of(id)?;
                self.registry.route(id, &parent, &message)?;
                Ok("Message sent to your superior.".to_string())
            }
            Action::HireWorker {
                worker_label,
                task_description,
            } => {
                let child = self.spawn_child(id, Role::General, &worker_label, &task_description)?;
                Ok(format!("Task '{child}' created successfully."))
            }
            Action::TerminateWorker { task_id } | Action::TerminateTask { task_id } => {
                self.dismiss(id, &task_id)?;
                Ok(format!("Task {task_id} successfully terminated."))
            }
            Action::RunShellCommand {
                command,
                timeout_secs,
            } => {
                info!(agent = %id, command = %command, "running sandboxed command");
                self.sandbox
                    .run(&command, id, timeout_secs.map(Duration::from_secs))
                    .ok_or(ToolError::NoSandbox)
            }
            Action::WriteToScratchpad { text } => {
                if let Some(agent) = self.registry.lookup_mut(id) {
                    agent.add_note(&text);
                }
                Ok("Added entry to your scratchpad.".to_string())
            }
            Action::SubmitWork { work_result } => {
                let parent = self.superior_of(id)?;
                self.registry.route(
                    id,
                    &parent,
                    &format!("Submitting task, please evaluate: {work_result}"),
                )?;
                Ok("Your work has been successfully submitted. It's currently being verified."
                    .to_string())
            }
            Action::SleepThroughTurn {} => Ok("Sleeping through this turn.".to_string()),
            Action::CreateTask {
                label,
                task,
                task_kind,
            } => {
                let role = match task_kind {
                    TaskKind::Abstract => Role::Manager,
                    TaskKind::Technical => Role::Worker,
                };
                let child = self.spawn_child(id, role, &label, &task)?;
                Ok(format!("Task '{child}' created successfully."))
            }
            Action::AcceptTaskResult { task_id } => {
                self.dismiss(id, &task_id)?;
                Ok(format!("Task {task_id} closed as completed."))
            }
            Action::DenyTaskResult {
                task_id,
                denial_reason,
            } => {
                self.require_child(id, &task_id)?;
                self.registry.route(
                    id,
                    &task_id,
                    &format!("NOTIFICATION: Task result has been denied: {denial_reason}"),
                )?;
                Ok("Task result denied. Notified worker about the denial reason.".to_string())
            }
            Action::ApproveWork {
                worker_id,
                optional_comment,
            } => {
                let comment = optional_comment
                    .as_deref()
                    .map(str::trim)
                    .filter(|text| !text.is_empty());
                let notice = match comment {
                    Some(text) => format!("Work approved: {text}"),
                    None => "Work approved.".to_string(),
                };
                self.registry.route(id, &worker_id, &notice)?;

                let parent = self
                    .registry
                    .lookup(id)
                    .and_then(|agent| agent.parent_id().cloned());
                if let Some(parent) = parent {
                    let forward = match comment {
                        Some(text) => format!("Approved work from {worker_id}: {text}"),
                        None => format!("Approved work from {worker_id}."),
                    };
                    self.registry.route(id, &parent, &forward)?;
                    return Ok(format!(
                        "Work approved. Notified {worker_id} and your superior."
                    ));
                }
                Ok(format!("Work approved. Notified {worker_id}."))
            }
            Action::RequestChanges {
                worker_id,
                requested_changes,
            } => {
                self.registry.route(
                    id,
                    &worker_id,
                    &format!("Changes requested: {requested_changes}"),
                )?;
                Ok(format!("Change request sent to {worker_id}."))
            }
            Action::ApproveTask { requester_id } => {
                self.registry
                    .route(id, &requester_id, "Task creation approved.")?;
                Ok(format!("Approval sent to {requester_id}."))
            }
            Action::ModifyAndApproveTask {
                requester_id,
                new_task,
                executor,
            } => {
                self.registry.route(
                    id,
                    &requester_id,
                    &format!(
                        "Task creation approved with modifications. Assign it to a {}: {new_task}",
                        executor.executor_label()
                    ),
                )?;
                Ok(format!("Modified task approved and sent to {requester_id}."))
            }
            Action::DenyTaskCreation {
                requester_id,
                denial_reason,
            } => {
                self.registry.route(
                    id,
                    &requester_id,
                    &format!("Task creation denied: {denial_reason}"),
                )?;
                Ok(format!("Denial sent to {requester_id}."))
            }
        }
    }

    fn superior_of(&self, id: &AgentId) -> Result<AgentId, ToolError> {
        self.registry
            .lookup(id)
            .and_then(|agent| agent.parent_id().cloned())
            .ok_or(ToolError::NoSuperior)
    }

    fn require_child(&self, id: &AgentId, child: &AgentId) -> Result<(), ToolError> {
        let owned = self
            .registry
            .lookup(id)
            .is_some_and(|agent| agent.has_child(child) && agent.has_chat(child));
        if owned {
            Ok(())
        } else {
            Err(ToolError::TaskNotFound(child.clone()))
        }
    }
}
