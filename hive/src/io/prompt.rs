//! Prompt assembly for one agent answering one peer.
//!
//! A prompt is `[role text, identity + task, status digest?, chat history]`.
//! Role texts are opaque configuration; the identity and digest sections are
//! minijinja templates. Chat history is trimmed from the oldest end when the
//! prompt would exceed its byte budget. The chat itself is never modified.

use anyhow::{Result, anyhow};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::agent::Agent;
use crate::core::chat::ChatEntry;
use crate::core::ids::AgentId;
use crate::core::role::Role;
use crate::core::types::PromptMessage;
use crate::registry::Registry;

const GENERAL_TEMPLATE: &str = include_str!("prompts/general.md");
const MANAGER_TEMPLATE: &str = include_str!("prompts/manager.md");
const WORKER_TEMPLATE: &str = include_str!("prompts/worker.md");
const VERIFIER_TEMPLATE: &str = include_str!("prompts/verifier.md");
const OVERSEER_TEMPLATE: &str = include_str!("prompts/overseer.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const DIGEST_TEMPLATE: &str = include_str!("prompts/digest.md");

#[derive(Debug, Clone, Serialize)]
struct PartyContext {
    id: String,
    label: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChildContext {
    id: String,
    label: String,
    role: String,
    task: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatContext {
    id: String,
    label: String,
    pending: bool,
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("general", GENERAL_TEMPLATE),
            ("manager", MANAGER_TEMPLATE),
            ("worker", WORKER_TEMPLATE),
            ("verifier", VERIFIER_TEMPLATE),
            ("overseer", OVERSEER_TEMPLATE),
            ("task", TASK_TEMPLATE),
            ("digest", DIGEST_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("built-in prompt templates should be valid");
        }
        Self { env }
    }

    fn render_role(&self, role: Role) -> Result<String> {
        if !role.is_scheduled() {
            return Err(anyhow!("role {role} has no prompt"));
        }
        let template = self.env.get_template(role.as_str())?;
        Ok(template.render(context! {})?.trim().to_string())
    }

    fn render_task(&self, agent: &Agent, peer: &AgentId, registry: &Registry) -> Result<String> {
        let superior = agent
            .parent_id()
            .and_then(|id| registry.lookup(id))
            .map(party);
        let peer_label = agent
            .chat(peer)
            .map(|view| view.peer_label().to_string())
            .unwrap_or_default();
        let template = self.env.get_template("task")?;
        let rendered = template.render(context! {
            id => agent.id().as_str(),
            label => agent.label(),
            task => agent.task().trim(),
            superior => superior,
            peer => PartyContext { id: peer.to_string(), label: peer_label },
        })?;
        Ok(rendered.trim().to_string())
    }

    /// Children, open chats and scratch notes. `None` when all are empty.
    fn render_digest(&self, agent: &Agent, registry: &Registry) -> Result<Option<String>> {
        let children: Vec<ChildContext> = agent
            .children()
            .iter()
            .filter_map(|id| registry.lookup(id))
            .map(|child| ChildContext {
                id: child.id().to_string(),
                label: child.label().to_string(),
                role: child.role().to_string(),
                task: child.task().trim().to_string(),
            })
            .collect();
        let chats: Vec<ChatContext> = agent
            .chats()
            .map(|view| ChatContext {
                id: view.peer_id().to_string(),
                label: view.peer_label().to_string(),
                pending: agent.pending().contains(view.peer_id()),
            })
            .collect();
        let template = self.env.get_template("digest")?;
        let rendered = template.render(context! {
            children => children,
            chats => chats,
            notes => agent.notes(),
        })?;
        let rendered = rendered.trim();
        Ok((!rendered.is_empty()).then(|| rendered.to_string()))
    }

    /// Build the full message list for `agent` answering `peer`.
    pub fn build(
        &self,
        agent: &Agent,
        peer: &AgentId,
        registry: &Registry,
        budget_bytes: usize,
    ) -> Result<Vec<PromptMessage>> {
        let mut messages = vec![
            PromptMessage::System {
                content: self.render_role(agent.role())?,
            },
            PromptMessage::System {
                content: self.render_task(agent, peer, registry)?,
            },
        ];
        if let Some(digest) = self.render_digest(agent, registry)? {
            messages.push(PromptMessage::System { content: digest });
        }

        let fixed: usize = messages.iter().map(message_weight).sum();
        let history = agent
            .chat(peer)
            .map(|view| view.history())
            .unwrap_or_default();
        let (omitted, kept) = fit_history(history, budget_bytes.saturating_sub(fixed));
        if omitted > 0 {
            debug!(agent = %agent.id(), peer = %peer, omitted, "dropped chat history for budget");
            messages.push(PromptMessage::System {
                content: format!("[{omitted} earlier messages omitted]"),
            });
        }
        messages.extend(kept.iter().map(to_message));
        Ok(messages)
    }
}

fn party(agent: &Agent) -> PartyContext {
    PartyContext {
        id: agent.id().to_string(),
        label: agent.label().to_string(),
    }
}

fn message_weight(message: &PromptMessage) -> usize {
    match message {
        PromptMessage::System { content }
        | PromptMessage::Human { content }
        | PromptMessage::Tool { content, .. } => content.len(),
        PromptMessage::Assistant { content, .. } => content.as_deref().map_or(0, str::len),
    }
}

/// Keep the newest entries that fit `budget`, always at least the last one.
/// Tool results whose intent was dropped are dropped with it.
fn fit_history(history: &[ChatEntry], budget: usize) -> (usize, &[ChatEntry]) {
    let mut used = 0usize;
    let mut start = history.len();
    while start > 0 {
        let weight = history[start - 1].weight();
        if start < history.len() && used + weight > budget {
            break;
        }
        used += weight;
        start -= 1;
    }
    while start < history.len() && matches!(history[start], ChatEntry::ToolResult(_)) {
        start += 1;
    }
    (start, &history[start..])
}

fn to_message(entry: &ChatEntry) -> PromptMessage {
    match entry {
        ChatEntry::Own(text) => PromptMessage::Assistant {
            content: Some(text.clone()),
            tool_calls: Vec::new(),
        },
        ChatEntry::Peer(text) => PromptMessage::Human {
            content: text.clone(),
        },
        ChatEntry::ToolIntent(calls) => PromptMessage::Assistant {
            content: None,
            tool_calls: calls.clone(),
        },
        ChatEntry::ToolResult(result) => PromptMessage::Tool {
            correlation_id: result.correlation_id.clone(),
            content: result.content.clone(),
        },
        ChatEntry::Notice(text) => PromptMessage::System {
            content: text.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ToolCall, ToolResult};
    use serde_json::json;

    fn setup() -> (Registry, AgentId, AgentId) {
        let mut registry = Registry::new();
        let boss = AgentId::new("1-aaa");
        let worker = AgentId::new("2-bbb");
        registry
            .register(Agent::new(boss.clone(), None, Role::General, "Lead", "ship it"))
            .expect("register");
        registry
            .register(Agent::new(
                worker.clone(),
                Some(boss.clone()),
                Role::Worker,
                "Coder",
                "print\nhello",
            ))
            .expect("register");
        registry.open_chat(&boss, &worker).expect("open");
        if let Some(agent) = registry.lookup_mut(&boss) {
            agent.add_child(worker.clone());
            agent.add_note("remember the deadline");
        }
        (registry, boss, worker)
    }

    #[test]
    fn prompt_starts_with_role_and_task() {
        let (mut registry, boss, worker) = setup();
        registry.route(&boss, &worker, "please start").expect("route");
        let engine = PromptEngine::new();
        let agent = registry.lookup(&worker).expect("worker");
        let messages = engine.build(agent, &boss, &registry, 60_000).expect("build");

        let PromptMessage::System { content: role } = &messages[0] else {
            panic!("role text first");
        };
        assert!(role.contains("technical worker"));
        let PromptMessage::System { content: task } = &messages[1] else {
            panic!("task second");
        };
        assert!(task.contains("print\nhello"));
        assert!(task.contains("Your superior is Lead [id: 1-aaa]"));
        assert!(task.contains("You are answering Lead [id: 1-aaa]"));
        assert_eq!(
            messages.last(),
            Some(&PromptMessage::Human {
                content: "please start".to_string()
            })
        );
    }

    #[test]
    fn digest_lists_children_and_notes() {
        let (registry, boss, worker) = setup();
        let engine = PromptEngine::new();
        let agent = registry.lookup(&boss).expect("boss");
        let messages = engine.build(agent, &worker, &registry, 60_000).expect("build");
        let PromptMessage::System { content: digest } = &messages[2] else {
            panic!("digest third");
        };
        assert!(digest.contains("- Coder [id: 2-bbb, worker] is executing task: print hello"));
        assert!(digest.contains("- remember the deadline"));
    }

    #[test]
    fn history_maps_entry_kinds() {
        let entries = [
            ChatEntry::ToolIntent(vec![ToolCall {
                correlation_id: "c1".to_string(),
                name: "submit_work".to_string(),
                arguments: json!({}),
            }]),
            ChatEntry::ToolResult(ToolResult {
                correlation_id: "c1".to_string(),
                name: "submit_work".to_string(),
                content: "ok".to_string(),
                is_error: false,
            }),
            ChatEntry::Notice("note".to_string()),
        ];
        let mapped: Vec<PromptMessage> = entries.iter().map(to_message).collect();
        assert!(matches!(&mapped[0], PromptMessage::Assistant { tool_calls, .. } if tool_calls.len() == 1));
        assert!(matches!(&mapped[1], PromptMessage::Tool { correlation_id, .. } if correlation_id == "c1"));
        assert!(matches!(&mapped[2], PromptMessage::System { .. }));
    }

    #[test]
    fn budget_drops_oldest_history_and_orphaned_results() {
        let history = vec![
            ChatEntry::Peer("a".repeat(50)),
            ChatEntry::ToolIntent(vec![ToolCall {
                correlation_id: "c1".to_string(),
                name: "x".repeat(40),
                arguments: json!(null),
            }]),
            ChatEntry::ToolResult(ToolResult {
                correlation_id: "c1".to_string(),
                name: "x".to_string(),
                content: "r".repeat(10),
                is_error: false,
            }),
            ChatEntry::Peer("b".repeat(10)),
        ];
        let (omitted, kept) = fit_history(&history, 25);
        assert_eq!(omitted, 3);
        assert_eq!(kept, &history[3..]);

        let (omitted, kept) = fit_history(&history, 10_000);
        assert_eq!(omitted, 0);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn last_entry_is_kept_even_over_budget() {
        let history = vec![ChatEntry::Peer("z".repeat(500))];
        let (omitted, kept) = fit_history(&history, 1);
        assert_eq!(omitted, 0);
        assert_eq!(kept.len(), 1);
    }
}
