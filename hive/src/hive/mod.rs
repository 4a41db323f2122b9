//! The run context: registry, model handle, sandboxes and tools.
//!
//! A [`Hive`] is created once per run and owns every agent through its
//! [`Registry`]. Agents refer to each other only by id; a parent's
//! `children` list expresses ownership, and destroying an agent destroys
//! its whole subtree. The driver seeds the root through the external
//! endpoint and then calls [`Hive::sweep`] repeatedly.

mod actions;
mod turn;

use std::fmt::Write as _;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::core::chat::ChatEntry;
use crate::core::error::{RouteError, ToolError};
use crate::core::ids::{AgentId, IdGenerator};
use crate::core::role::Role;
use crate::io::config::HiveConfig;
use crate::io::model::{Model, RetryPolicy};
use crate::io::prompt::PromptEngine;
use crate::io::sandbox::SandboxManager;
use crate::registry::Registry;
use crate::tools::ToolBox;

pub use turn::{SweepReport, TurnReport};

const EXTERNAL_LABEL: &str = "The User";

pub struct Hive<M: Model> {
    config: HiveConfig,
    model: M,
    retry: RetryPolicy,
    registry: Registry,
    sandbox: SandboxManager,
    toolbox: ToolBox,
    prompts: PromptEngine,
    ids: IdGenerator,
    root_id: AgentId,
    external_id: AgentId,
}

impl<M: Model> Hive<M> {
    /// Build the run context with the external endpoint and the root agent.
    ///
    /// The root starts idle; hand it an objective with
    /// [`Hive::deliver_external`].
    pub fn new(config: HiveConfig, model: M) -> Result<Self> {
        config.validate()?;
        let retry = RetryPolicy::from_config(&config.model);
        let sandbox = SandboxManager::new(config.sandbox.clone());
        let mut hive = Self {
            retry,
            model,
            registry: Registry::new(),
            sandbox,
            toolbox: ToolBox::new()?,
            prompts: PromptEngine::new(),
            ids: IdGenerator::new(),
            root_id: AgentId::external(),
            external_id: AgentId::external(),
            config,
        };

        hive.registry.register(Agent::new(
            hive.external_id.clone(),
            None,
            Role::External,
            EXTERNAL_LABEL,
            "",
        ))?;
        let root = hive.config.root.clone();
        let external = hive.external_id.clone();
        let root_id = hive
            .create_agent(Some(&external), root.role, &root.label, &root.task)
            .map_err(|err| anyhow::anyhow!("create root agent: {err}"))?;
        info!(root = %root_id, role = %root.role, "hive ready");
        hive.root_id = root_id;
        Ok(hive)
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sandbox(&self) -> &SandboxManager {
        &self.sandbox
    }

    pub fn root_id(&self) -> &AgentId {
        &self.root_id
    }

    pub fn external_id(&self) -> &AgentId {
        &self.external_id
    }

    /// Deliver driver text into the root's external conversation.
    pub fn deliver_external(&mut self, text: &str) -> Result<(), RouteError> {
        let (from, to) = (self.external_id.clone(), self.root_id.clone());
        self.registry.route(&from, &to, text)
    }

    /// The external endpoint's view of its chat with the root.
    pub fn external_transcript(&self) -> &[ChatEntry] {
        self.registry
            .lookup(&self.external_id)
            .and_then(|external| external.chat(&self.root_id))
            .map(|view| view.history())
            .unwrap_or_default()
    }

    /// Open an ad hoc chat between two live agents. A non-empty `reason` is
    /// sent from `a` to `b` as the opening message.
    pub fn connect(&mut self, a: &AgentId, b: &AgentId, reason: &str) -> Result<()> {
        self.registry.open_chat(a, b)?;
        if !reason.trim().is_empty() {
            self.registry.route(a, b, reason.trim())?;
        }
        Ok(())
    }

    /// Add an agent of any scheduled role under `parent` without messaging it.
    pub fn attach(&mut self, parent: &AgentId, role: Role, label: &str, task: &str) -> Result<AgentId> {
        if !role.is_scheduled() {
            bail!("cannot attach an agent with role {role}");
        }
        let Some(parent_agent) = self.registry.lookup(parent) else {
            bail!("unknown parent {parent}");
        };
        if !parent_agent.role().accepts_children() {
            bail!("{parent} ({}) cannot have children", parent_agent.role());
        }
        let id = self
            .create_agent(Some(parent), role, label, task)
            .map_err(|err| anyhow::anyhow!("attach {label}: {err}"))?;
        if let Some(agent) = self.registry.lookup_mut(parent) {
            agent.add_child(id.clone());
        }
        Ok(id)
    }

    /// Indented listing of the live tree.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.summarize(&self.root_id, 0, &mut out);
        out
    }

    fn summarize(&self, id: &AgentId, depth: usize, out: &mut String) {
        let Some(agent) = self.registry.lookup(id) else {
            return;
        };
        let _ = writeln!(
            out,
            "{:indent$}{} [{}] {} (pending: {})",
            "",
            agent.label(),
            agent.id(),
            agent.role(),
            agent.pending().len(),
            indent = depth * 2
        );
        for child in agent.children() {
            self.summarize(child, depth + 1, out);
        }
    }

    /// Allocate, register and connect a new agent to its parent.
    fn create_agent(
        &mut self,
        parent: Option<&AgentId>,
        role: Role,
        label: &str,
        task: &str,
    ) -> Result<AgentId, ToolError> {
        let id = self.ids.next_id();
        if role.has_sandbox() {
            self.sandbox
                .create(&id)
                .map_err(|err| ToolError::Failed(format!("{err:#}")))?;
        }
        let agent = Agent::new(id.clone(), parent.cloned(), role, label.trim(), task);
        if let Err(err) = self.registry.register(agent) {
            self.sandbox.destroy(&id);
            return Err(ToolError::Failed(err.to_string()));
        }
        if let Some(parent) = parent
            && let Err(err) = self.registry.open_chat(parent, &id)
        {
            self.sandbox.destroy(&id);
            self.registry.remove(&id);
            return Err(err.into());
        }
        debug!(agent = %id, role = %role, parent = ?parent.map(AgentId::as_str), "created agent");
        Ok(id)
    }

    /// Create a child under `parent` and send it its task as the opening message.
    pub(crate) fn spawn_child(
        &mut self,
        parent: &AgentId,
        role: Role,
        label: &str,
        task: &str,
    ) -> Result<AgentId, ToolError> {
        let id = self.create_agent(Some(parent), role, label, task)?;
        if let Some(agent) = self.registry.lookup_mut(parent) {
            agent.add_child(id.clone());
        }
        self.registry.route(parent, &id, task)?;
        info!(parent = %parent, child = %id, role = %role, label, "spawned child");
        Ok(id)
    }

    /// Detach `child` from `parent` and destroy its subtree.
    pub(crate) fn dismiss(&mut self, parent: &AgentId, child: &AgentId) -> Result<(), ToolError> {
        let owned = self
            .registry
            .lookup(parent)
            .is_some_and(|agent| agent.has_child(child) && agent.has_chat(child));
        if !owned {
            return Err(ToolError::TaskNotFound(child.clone()));
        }
        if let Some(agent) = self.registry.lookup_mut(parent) {
            agent.remove_child(child);
        }
        self.destroy_subtree(child);
        info!(parent = %parent, child = %child, "dismissed child");
        Ok(())
    }

    fn destroy_subtree(&mut self, id: &AgentId) {
        let Some(agent) = self.registry.lookup(id) else {
            warn!(agent = %id, "destroying unknown agent");
            return;
        };
        let children = agent.children().to_vec();
        let peers: Vec<AgentId> = agent.chats().map(|view| view.peer_id().clone()).collect();
        for child in &children {
            self.destroy_subtree(child);
        }
        for peer in &peers {
            self.registry.detach_chat(id, peer);
        }
        self.sandbox.destroy(id);
        self.registry.remove(id);
        debug!(agent = %id, "destroyed agent");
    }
}
