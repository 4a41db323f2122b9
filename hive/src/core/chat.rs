//! One side of a chat pair.
//!
//! A chat pair models one relationship edge. Each endpoint owns its own
//! [`ChatView`] and refers to the other side only by id; the registry keeps
//! the two views consistent when messages are routed or chats are closed.

use serde::Serialize;

use super::ids::AgentId;
use super::types::{ToolCall, ToolResult};

/// A typed entry in one side's chat history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ChatEntry {
    /// Authored by the owner of this view.
    Own(String),
    /// Authored by the peer (or attributed to it, as with nudges).
    Peer(String),
    /// Tool calls the owner's model asked for.
    ToolIntent(Vec<ToolCall>),
    /// Result of one of those calls. Local only.
    ToolResult(ToolResult),
    /// Scheduler notice. Local only.
    Notice(String),
}

impl ChatEntry {
    pub fn text(&self) -> &str {
        match self {
            ChatEntry::Own(text) | ChatEntry::Peer(text) | ChatEntry::Notice(text) => text,
            ChatEntry::ToolResult(result) => &result.content,
            ChatEntry::ToolIntent(_) => "",
        }
    }

    /// Approximate prompt footprint in bytes.
    pub fn weight(&self) -> usize {
        match self {
            ChatEntry::ToolIntent(calls) => calls
                .iter()
                .map(|call| call.name.len() + call.arguments.to_string().len())
                .sum(),
            other => other.text().len(),
        }
    }
}

/// One endpoint's view of a chat pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatView {
    peer_id: AgentId,
    peer_label: String,
    history: Vec<ChatEntry>,
}

impl ChatView {
    pub fn new(peer_id: AgentId, peer_label: impl Into<String>) -> Self {
        Self {
            peer_id,
            peer_label: peer_label.into(),
            history: Vec::new(),
        }
    }

    pub fn peer_id(&self) -> &AgentId {
        &self.peer_id
    }

    pub fn peer_label(&self) -> &str {
        &self.peer_label
    }

    pub fn history(&self) -> &[ChatEntry] {
        &self.history
    }

    pub fn push(&mut self, entry: ChatEntry) {
        self.history.push(entry);
    }

    pub fn count_peer_entries(&self) -> usize {
        self.history
            .iter()
            .filter(|entry| matches!(entry, ChatEntry::Peer(_)))
            .count()
    }

    pub fn count_own_entries(&self) -> usize {
        self.history
            .iter()
            .filter(|entry| matches!(entry, ChatEntry::Own(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_entries_by_author() {
        let mut view = ChatView::new(AgentId::new("p"), "Peer");
        view.push(ChatEntry::Own("a".to_string()));
        view.push(ChatEntry::Peer("b".to_string()));
        view.push(ChatEntry::Peer("c".to_string()));
        view.push(ChatEntry::Notice("n".to_string()));
        assert_eq!(view.count_own_entries(), 1);
        assert_eq!(view.count_peer_entries(), 2);
        assert_eq!(view.history().len(), 4);
    }

    #[test]
    fn intent_weight_covers_arguments() {
        let entry = ChatEntry::ToolIntent(vec![ToolCall {
            correlation_id: "c".to_string(),
            name: "submit_work".to_string(),
            arguments: json!({"work_result": "done"}),
        }]);
        assert!(entry.weight() > "submit_work".len());
        assert_eq!(entry.text(), "");
    }
}
