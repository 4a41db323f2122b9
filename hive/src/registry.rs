//! Id-keyed directory of live agents and the only message bus between them.
//!
//! Agents never hold references to each other. Every cross-agent effect
//! (opening or closing a chat pair, delivering a message) goes through the
//! registry, which updates both endpoints together.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::agent::Agent;
use crate::core::chat::{ChatEntry, ChatView};
use crate::core::error::{ChatError, RegistryError, RouteError};
use crate::core::ids::AgentId;

#[derive(Debug, Default)]
pub struct Registry {
    agents: HashMap<AgentId, Agent>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live agent. Never overwrites an existing id.
    pub fn register(&mut self, agent: Agent) -> Result<(), RegistryError> {
        if self.agents.contains_key(agent.id()) {
            return Err(RegistryError::Duplicate(agent.id().clone()));
        }
        debug!(agent = %agent.id(), role = %agent.role(), "registered agent");
        self.agents.insert(agent.id().clone(), agent);
        Ok(())
    }

    pub fn lookup(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub(crate) fn lookup_mut(&mut self, id: &AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// Remove an agent. Callers detach its chats first.
    pub fn remove(&mut self, id: &AgentId) -> Option<Agent> {
        let removed = self.agents.remove(id);
        if let Some(agent) = &removed
            && agent.chats().next().is_some()
        {
            warn!(agent = %id, "removed agent still had open chats");
        }
        removed
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &AgentId> {
        self.agents.keys()
    }

    pub fn has_mutual_chat(&self, a: &AgentId, b: &AgentId) -> bool {
        match (self.agents.get(a), self.agents.get(b)) {
            (Some(left), Some(right)) => left.has_chat(b) && right.has_chat(a),
            _ => false,
        }
    }

    /// Open a chat pair between two live agents.
    pub fn open_chat(&mut self, a: &AgentId, b: &AgentId) -> Result<(), ChatError> {
        let a_label = self.label_of(a)?;
        let b_label = self.label_of(b)?;
        if self.agents.get(a).is_some_and(|agent| agent.has_chat(b))
            || self.agents.get(b).is_some_and(|agent| agent.has_chat(a))
        {
            return Err(ChatError::AlreadyOpen(a.clone(), b.clone()));
        }
        if let Some(agent) = self.agents.get_mut(a) {
            agent.insert_chat(ChatView::new(b.clone(), b_label));
        }
        if let Some(agent) = self.agents.get_mut(b) {
            agent.insert_chat(ChatView::new(a.clone(), a_label));
        }
        debug!(a = %a, b = %b, "opened chat pair");
        Ok(())
    }

    /// Close a peer chat on behalf of `closer`. Parent edges are refused.
    pub fn close_chat(&mut self, closer: &AgentId, peer: &AgentId) -> Result<(), ChatError> {
        let agent = self
            .agents
            .get(closer)
            .ok_or_else(|| ChatError::UnknownAgent(closer.clone()))?;
        if !agent.has_chat(peer) {
            return Err(ChatError::NotOpen(peer.clone()));
        }
        let peer_is_child = self
            .agents
            .get(peer)
            .is_some_and(|other| other.is_parent(closer));
        if agent.is_parent(peer) || peer_is_child {
            return Err(ChatError::ParentEdge(closer.clone(), peer.clone()));
        }
        self.detach_chat(closer, peer);
        Ok(())
    }

    /// Remove both views of a chat pair unconditionally.
    pub(crate) fn detach_chat(&mut self, a: &AgentId, b: &AgentId) {
        if let Some(agent) = self.agents.get_mut(a) {
            agent.remove_chat(b);
        }
        if let Some(agent) = self.agents.get_mut(b) {
            agent.remove_chat(a);
        }
        debug!(a = %a, b = %b, "closed chat pair");
    }

    /// Deliver `text` from `from` to `to` and queue a response obligation on `to`.
    pub fn route(&mut self, from: &AgentId, to: &AgentId, text: &str) -> Result<(), RouteError> {
        if !self.agents.contains_key(from) {
            return Err(RouteError::UnknownAgent(from.clone()));
        }
        if !self.agents.contains_key(to) {
            return Err(RouteError::UnknownAgent(to.clone()));
        }
        if !self.has_mutual_chat(from, to) {
            return Err(RouteError::NoChat {
                from: from.clone(),
                to: to.clone(),
            });
        }
        if let Some(sender) = self.agents.get_mut(from) {
            sender.record(to, ChatEntry::Own(text.to_string()));
        }
        if let Some(receiver) = self.agents.get_mut(to) {
            receiver.record(from, ChatEntry::Peer(text.to_string()));
            receiver.queue_response(from.clone());
        }
        debug!(from = %from, to = %to, bytes = text.len(), "routed message");
        Ok(())
    }

    fn label_of(&self, id: &AgentId) -> Result<String, ChatError> {
        self.agents
            .get(id)
            .map(|agent| agent.label().to_string())
            .ok_or_else(|| ChatError::UnknownAgent(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::role::Role;

    fn registry_with(agents: &[(&str, Option<&str>)]) -> Registry {
        let mut registry = Registry::new();
        for (id, parent) in agents {
            registry
                .register(Agent::new(
                    AgentId::new(*id),
                    parent.map(AgentId::new),
                    Role::General,
                    id.to_uppercase(),
                    "task",
                ))
                .expect("register");
        }
        registry
    }

    fn id(raw: &str) -> AgentId {
        AgentId::new(raw)
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = registry_with(&[("a", None)]);
        let err = registry
            .register(Agent::new(id("a"), None, Role::Worker, "A2", "t"))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate(id("a")));
        assert_eq!(registry.lookup(&id("a")).expect("a").role(), Role::General);
    }

    #[test]
    fn lookup_unknown_is_absent() {
        let registry = registry_with(&[]);
        assert!(registry.lookup(&id("ghost")).is_none());
    }

    #[test]
    fn route_appends_one_entry_per_side_and_deduplicates_obligation() {
        let mut registry = registry_with(&[("a", None), ("b", None)]);
        registry.open_chat(&id("a"), &id("b")).expect("open");

        registry.route(&id("a"), &id("b"), "first").expect("route 1");
        let sender = registry.lookup(&id("a")).expect("a");
        let receiver = registry.lookup(&id("b")).expect("b");
        assert_eq!(sender.chat(&id("b")).expect("view").count_own_entries(), 1);
        assert_eq!(sender.chat(&id("b")).expect("view").history().len(), 1);
        assert_eq!(receiver.chat(&id("a")).expect("view").count_peer_entries(), 1);
        assert_eq!(receiver.chat(&id("a")).expect("view").history().len(), 1);
        assert_eq!(receiver.pending().len(), 1);

        registry.route(&id("a"), &id("b"), "second").expect("route 2");
        let receiver = registry.lookup(&id("b")).expect("b");
        assert_eq!(receiver.pending().len(), 1);
        assert!(registry.lookup(&id("a")).expect("a").pending().is_empty());
    }

    #[test]
    fn route_without_chat_fails() {
        let mut registry = registry_with(&[("a", None), ("b", None)]);
        let err = registry.route(&id("a"), &id("b"), "hi").unwrap_err();
        assert_eq!(
            err,
            RouteError::NoChat {
                from: id("a"),
                to: id("b")
            }
        );
        assert!(registry.lookup(&id("b")).expect("b").pending().is_empty());
    }

    #[test]
    fn route_to_unknown_fails() {
        let mut registry = registry_with(&[("a", None)]);
        let err = registry.route(&id("a"), &id("ghost"), "hi").unwrap_err();
        assert_eq!(err, RouteError::UnknownAgent(id("ghost")));
    }

    #[test]
    fn close_peer_chat_is_symmetric() {
        let mut registry = registry_with(&[("a", None), ("b", None)]);
        registry.open_chat(&id("a"), &id("b")).expect("open");
        registry.route(&id("b"), &id("a"), "question").expect("route");

        registry.close_chat(&id("b"), &id("a")).expect("close");
        let a = registry.lookup(&id("a")).expect("a");
        let b = registry.lookup(&id("b")).expect("b");
        assert!(!a.has_chat(&id("b")));
        assert!(!b.has_chat(&id("a")));
        assert!(a.pending().is_empty());
    }

    #[test]
    fn parent_edge_cannot_be_closed_from_either_side() {
        let mut registry = registry_with(&[("p", None), ("c", Some("p"))]);
        registry.open_chat(&id("p"), &id("c")).expect("open");

        let from_child = registry.close_chat(&id("c"), &id("p")).unwrap_err();
        assert!(matches!(from_child, ChatError::ParentEdge(_, _)));
        let from_parent = registry.close_chat(&id("p"), &id("c")).unwrap_err();
        assert!(matches!(from_parent, ChatError::ParentEdge(_, _)));
        assert!(registry.has_mutual_chat(&id("p"), &id("c")));
    }

    #[test]
    fn open_chat_twice_fails() {
        let mut registry = registry_with(&[("a", None), ("b", None)]);
        registry.open_chat(&id("a"), &id("b")).expect("open");
        let err = registry.open_chat(&id("b"), &id("a")).unwrap_err();
        assert!(matches!(err, ChatError::AlreadyOpen(_, _)));
    }
}
