//! Sweeps, turns and per-peer exchanges.

use tracing::{debug, info, instrument, warn};

use super::Hive;
use crate::core::chat::ChatEntry;
use crate::core::error::{HiveError, ModelError, RegistryError, TurnFailure};
use crate::core::ids::AgentId;
use crate::core::types::{ModelRequest, ToolCall, ToolResult};
use crate::io::model::{Model, invoke_with_retry};

pub(crate) const NO_ACTION_NOTICE: &str =
    "No action taken: no tools were called. All non-tool output is ignored.";
pub(crate) const NUDGE_MESSAGE: &str = "Check-in: you have not had anything to respond to for a while. \
     Report your progress, or continue your work if you are waiting on others.";

/// What happened during one agent's turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub agent: AgentId,
    /// Peers whose exchange ran to completion.
    pub answered: Vec<AgentId>,
    pub idle: bool,
    pub nudged: bool,
    pub failures: Vec<TurnFailure>,
}

impl TurnReport {
    fn new(agent: AgentId) -> Self {
        Self {
            agent,
            answered: Vec::new(),
            idle: false,
            nudged: false,
            failures: Vec::new(),
        }
    }
}

/// Turns in the order they ran during one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub turns: Vec<TurnReport>,
}

impl SweepReport {
    pub fn order(&self) -> Vec<&AgentId> {
        self.turns.iter().map(|turn| &turn.agent).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TurnFailure> {
        self.turns.iter().flat_map(|turn| turn.failures.iter())
    }

    pub fn turn(&self, agent: &AgentId) -> Option<&TurnReport> {
        self.turns.iter().find(|turn| &turn.agent == agent)
    }
}

impl<M: Model> Hive<M> {
    /// Run every live agent's turn once, children before parents.
    ///
    /// Per-peer failures are collected in the report. Only infrastructure
    /// faults end the sweep early.
    #[instrument(skip_all)]
    pub fn sweep(&mut self) -> Result<SweepReport, HiveError> {
        let mut report = SweepReport::default();
        let root = self.root_id.clone();
        self.visit(&root, &mut report)?;
        info!(
            turns = report.turns.len(),
            failures = report.failures().count(),
            "sweep finished"
        );
        Ok(report)
    }

    fn visit(&mut self, id: &AgentId, report: &mut SweepReport) -> Result<(), HiveError> {
        let Some(agent) = self.registry.lookup(id) else {
            return Ok(());
        };
        if !agent.role().is_scheduled() {
            return Ok(());
        }
        if agent.role().visits_children() {
            let children = agent.children().to_vec();
            if let Some(missing) = children.iter().find(|child| !self.registry.contains(child)) {
                return Err(RegistryError::Missing(missing.clone()).into());
            }
            for child in &children {
                self.visit(child, report)?;
            }
        }
        if let Some(turn) = self.run_turn(id)? {
            report.turns.push(turn);
        }
        Ok(())
    }

    /// Answer every peer pending at the start of the turn.
    ///
    /// Returns `None` if the agent no longer exists.
    #[instrument(skip_all, fields(agent = %id))]
    pub fn run_turn(&mut self, id: &AgentId) -> Result<Option<TurnReport>, HiveError> {
        let threshold = self.config.idle_nudge_threshold;
        let Some(agent) = self.registry.lookup_mut(id) else {
            return Ok(None);
        };
        let mut report = TurnReport::new(id.clone());
        let snapshot: Vec<AgentId> = agent.pending().iter().cloned().collect();

        if snapshot.is_empty() {
            report.idle = true;
            if agent.tick_idle(threshold)
                && let Some(parent) = agent.parent_id().cloned()
                && agent.record(&parent, ChatEntry::Peer(NUDGE_MESSAGE.to_string()))
            {
                agent.queue_response(parent);
                report.nudged = true;
                info!(idle_turns = threshold, "nudged idle agent");
            }
            return Ok(Some(report));
        }
        agent.reset_idle();

        for peer in &snapshot {
            match self.exchange(id, peer)? {
                None => report.answered.push(peer.clone()),
                Some(failure) => {
                    warn!(%failure, "exchange failed, dropping this turn's obligation");
                    report.failures.push(failure);
                }
            }
        }
        // Peers queued during the pass are not in the snapshot and stay pending.
        if let Some(agent) = self.registry.lookup_mut(id) {
            agent.clear_pending(&snapshot);
        }
        Ok(Some(report))
    }

    /// One model exchange with `peer`. `Some` carries a per-peer failure.
    #[instrument(skip_all, fields(agent = %id, peer = %peer))]
    fn exchange(&mut self, id: &AgentId, peer: &AgentId) -> Result<Option<TurnFailure>, HiveError> {
        let Some(agent) = self.registry.lookup(id) else {
            return Ok(None);
        };
        if !agent.has_chat(peer) {
            debug!("chat closed before exchange");
            return Ok(None);
        }
        let messages = self
            .prompts
            .build(agent, peer, &self.registry, self.config.prompt_budget_bytes)
            .map_err(|err| HiveError::Prompt(format!("{err:#}")))?;
        let request = ModelRequest {
            agent_id: id.clone(),
            peer_id: peer.clone(),
            messages,
            tools: self.toolbox.specs(agent.capabilities()),
        };

        let reply = match invoke_with_retry(&self.model, &request, self.retry) {
            Ok(reply) => reply,
            Err(err @ ModelError::Unavailable(_)) => return Err(HiveError::ModelUnavailable(err)),
            Err(source) => {
                return Ok(Some(TurnFailure::Model {
                    agent: id.clone(),
                    peer: peer.clone(),
                    source,
                }));
            }
        };

        if reply.tool_calls.is_empty() {
            debug!("model called no tools");
            self.record(id, peer, ChatEntry::Notice(NO_ACTION_NOTICE.to_string()));
            return Ok(None);
        }

        self.record(id, peer, ChatEntry::ToolIntent(reply.tool_calls.clone()));
        for call in &reply.tool_calls {
            let result = self.execute(id, call);
            if !self.record(id, peer, ChatEntry::ToolResult(result)) {
                debug!(tool = %call.name, "chat closed, tool result not recorded");
            }
        }

        if let Some(text) = reply.routable_text()
            && let Err(source) = self.registry.route(id, peer, text)
        {
            return Ok(Some(TurnFailure::Routing {
                agent: id.clone(),
                peer: peer.clone(),
                source,
            }));
        }
        Ok(None)
    }

    /// Resolve and run one tool call. Failures become error results.
    pub(crate) fn execute(&mut self, id: &AgentId, call: &ToolCall) -> ToolResult {
        let permitted = self
            .registry
            .lookup(id)
            .map(|agent| agent.capabilities().to_vec())
            .unwrap_or_default();
        let outcome = self
            .toolbox
            .resolve(&permitted, call)
            .and_then(|action| self.perform(id, action));
        match outcome {
            Ok(content) => {
                debug!(agent = %id, tool = %call.name, "tool call succeeded");
                ToolResult {
                    correlation_id: call.correlation_id.clone(),
                    name: call.name.clone(),
                    content,
                    is_error: false,
                }
            }
            Err(err) => {
                debug!(agent = %id, tool = %call.name, err = %err, "tool call failed");
                ToolResult {
                    correlation_id: call.correlation_id.clone(),
                    name: call.name.clone(),
                    content: err.to_string(),
                    is_error: true,
                }
            }
        }
    }

    fn record(&mut self, id: &AgentId, peer: &AgentId, entry: ChatEntry) -> bool {
        self.registry
            .lookup_mut(id)
            .is_some_and(|agent| agent.record(peer, entry))
    }
}
