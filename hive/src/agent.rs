//! Agent state shared by every role.
//!
//! An [`Agent`] is plain data: its task, capability set, chat views, pending
//! queue, idle counter and children. Behavior that needs other agents (turns,
//! routing, hiring) lives on [`crate::hive::Hive`], which resolves peers by id
//! through the registry.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::chat::{ChatEntry, ChatView};
use crate::core::ids::AgentId;
use crate::core::role::{Capability, Role};

#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    parent_id: Option<AgentId>,
    label: String,
    role: Role,
    task: String,
    capabilities: Vec<Capability>,
    chats: BTreeMap<AgentId, ChatView>,
    pending: BTreeSet<AgentId>,
    idle_count: u32,
    children: Vec<AgentId>,
    notes: Vec<String>,
}

impl Agent {
    pub fn new(
        id: AgentId,
        parent_id: Option<AgentId>,
        role: Role,
        label: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            label: label.into(),
            role,
            task: task.into(),
            capabilities: role.capabilities(),
            chats: BTreeMap::new(),
            pending: BTreeSet::new(),
            idle_count: 0,
            children: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&AgentId> {
        self.parent_id.as_ref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The objective assigned at creation. Never changes.
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn chats(&self) -> impl Iterator<Item = &ChatView> {
        self.chats.values()
    }

    pub fn chat(&self, peer: &AgentId) -> Option<&ChatView> {
        self.chats.get(peer)
    }

    pub fn has_chat(&self, peer: &AgentId) -> bool {
        self.chats.contains_key(peer)
    }

    pub fn pending(&self) -> &BTreeSet<AgentId> {
        &self.pending
    }

    pub fn idle_count(&self) -> u32 {
        self.idle_count
    }

    pub fn children(&self) -> &[AgentId] {
        &self.children
    }

    pub fn has_child(&self, id: &AgentId) -> bool {
        self.children.contains(id)
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn is_parent(&self, id: &AgentId) -> bool {
        self.parent_id.as_ref() == Some(id)
    }

    pub(crate) fn insert_chat(&mut self, view: ChatView) {
        self.chats.insert(view.peer_id().clone(), view);
    }

    pub(crate) fn remove_chat(&mut self, peer: &AgentId) -> Option<ChatView> {
        self.pending.remove(peer);
        self.chats.remove(peer)
    }

    /// Append to the chat with `peer`. Returns false if that chat is closed.
    pub(crate) fn record(&mut self, peer: &AgentId, entry: ChatEntry) -> bool {
        match self.chats.get_mut(peer) {
            Some(view) => {
                view.push(entry);
                true
            }
            None => false,
        }
    }

    /// Add a response obligation. Returns false if one was already queued.
    pub(crate) fn queue_response(&mut self, from: AgentId) -> bool {
        self.pending.insert(from)
    }

    pub(crate) fn clear_pending(&mut self, processed: &[AgentId]) {
        for peer in processed {
            self.pending.remove(peer);
        }
    }

    /// Count one idle turn and report whether the nudge threshold was reached.
    pub(crate) fn tick_idle(&mut self, threshold: u32) -> bool {
        self.idle_count = self.idle_count.saturating_add(1);
        self.idle_count == threshold
    }

    pub(crate) fn reset_idle(&mut self) {
        self.idle_count = 0;
    }

    pub(crate) fn add_child(&mut self, id: AgentId) {
        if !self.children.contains(&id) {
            self.children.push(id);
        }
    }

    pub(crate) fn remove_child(&mut self, id: &AgentId) -> bool {
        let before = self.children.len();
        self.children.retain(|child| child != id);
        self.children.len() != before
    }

    pub(crate) fn add_note(&mut self, text: &str) {
        self.notes.push(text.trim().to_string());
    }
}
