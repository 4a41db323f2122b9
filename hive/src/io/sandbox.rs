//! Per-agent sandboxed command execution.
//!
//! Each sandboxed agent gets a registered environment: a working directory
//! under the workspace plus the configured shell (optionally a container exec
//! wrapper). Commands are written to the shell's stdin after the resource-cap
//! prelude and always run under a wall-clock timeout with group kill.
//!
//! Files written in the working directory persist across commands. Shell
//! state does not: every command starts a fresh shell in that directory, so
//! `cd` and exported variables last only for the command that set them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::ids::AgentId;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

const WORKDIR_PLACEHOLDER: &str = "{workdir}";
const HEALTH_PROBE_ID: &str = "__health";

#[derive(Debug, Clone)]
struct Environment {
    workdir: PathBuf,
}

/// Result of the startup health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub echo: String,
    pub network: String,
}

#[derive(Debug)]
pub struct SandboxManager {
    config: SandboxConfig,
    environments: HashMap<AgentId, Environment>,
}

impl SandboxManager {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            environments: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Allocate the environment for `agent_id`. Idempotent.
    pub fn create(&mut self, agent_id: &AgentId) -> Result<()> {
        if self.environments.contains_key(agent_id) {
            return Ok(());
        }
        let workdir = self.config.workspace_dir.join(agent_id.as_str());
        fs::create_dir_all(&workdir)
            .with_context(|| format!("create sandbox dir {}", workdir.display()))?;
        debug!(agent = %agent_id, workdir = %workdir.display(), "created sandbox");
        self.environments.insert(agent_id.clone(), Environment { workdir });
        Ok(())
    }

    /// Release the environment. The working directory is left in place so
    /// the agent's output stays available to the rest of the tree.
    pub fn destroy(&mut self, agent_id: &AgentId) -> bool {
        let released = self.environments.remove(agent_id).is_some();
        if released {
            debug!(agent = %agent_id, "destroyed sandbox");
        }
        released
    }

    pub fn is_registered(&self, agent_id: &AgentId) -> bool {
        self.environments.contains_key(agent_id)
    }

    pub fn workdir(&self, agent_id: &AgentId) -> Option<&Path> {
        self.environments
            .get(agent_id)
            .map(|env| env.workdir.as_path())
    }

    /// Run `command_text` for `agent_id`.
    ///
    /// Returns `None` when no environment is registered. Otherwise returns
    /// combined stdout/stderr, a timeout-marked message if the command was
    /// killed, or a sandbox error message if it could not be started.
    #[instrument(skip(self, command_text), fields(agent = %agent_id))]
    pub fn run(
        &self,
        command_text: &str,
        agent_id: &AgentId,
        timeout: Option<Duration>,
    ) -> Option<String> {
        let env = self.environments.get(agent_id)?;
        let timeout = self.config.effective_timeout(timeout);

        let mut script = String::new();
        if !self.config.prelude.trim().is_empty() {
            script.push_str(self.config.prelude.trim());
            script.push('\n');
        }
        script.push_str(command_text);
        script.push('\n');

        let output = match run_command_with_timeout(
            self.shell_command(&env.workdir),
            Some(script.as_bytes()),
            timeout,
            self.config.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "sandbox command failed to run");
                return Some(format!("Sandbox error: {err:#}"));
            }
        };

        if output.timed_out {
            return Some(format!(
                "Timeout error: Command terminated after {} seconds.",
                timeout.as_secs_f64()
            ));
        }
        Some(output.combined_text("sandbox"))
    }

    /// Confirm basic command execution and outbound network access.
    pub fn health_check(&mut self) -> Result<HealthReport> {
        let probe = AgentId::new(HEALTH_PROBE_ID);
        self.create(&probe)?;
        let echo = self
            .run(&self.config.echo_check, &probe, None)
            .unwrap_or_default();
        let network = self
            .run(&self.config.network_check, &probe, None)
            .unwrap_or_default();
        self.destroy(&probe);

        let report = HealthReport {
            echo: echo.trim().to_string(),
            network: network.trim().to_string(),
        };
        if report.echo != "OK" {
            bail!("sandbox health check failed: {:?}", report.echo);
        }
        if report.network != "OK" {
            bail!("sandbox network check failed: {:?}", report.network);
        }
        info!("sandbox health check passed");
        Ok(report)
    }

    fn shell_command(&self, workdir: &Path) -> Command {
        let workdir_text = workdir.display().to_string();
        let argv: Vec<String> = self
            .config
            .shell
            .iter()
            .map(|arg| arg.replace(WORKDIR_PLACEHOLDER, &workdir_text))
            .collect();
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]).current_dir(workdir);
        cmd
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn manager(workspace: &Path) -> SandboxManager {
        SandboxManager::new(SandboxConfig {
            shell: vec!["sh".to_string()],
            workspace_dir: workspace.to_path_buf(),
            prelude: String::new(),
            default_timeout_secs: 10,
            max_timeout_secs: 10,
            output_limit_bytes: 10_000,
            echo_check: "echo OK".to_string(),
            network_check: "echo OK".to_string(),
        })
    }

    #[test]
    fn run_without_environment_is_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = manager(temp.path());
        assert_eq!(sandbox.run("echo hi", &AgentId::new("1-abc"), None), None);
    }

    #[test]
    fn run_returns_combined_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = manager(temp.path());
        let id = AgentId::new("1-abc");
        sandbox.create(&id).expect("create");
        let out = sandbox
            .run("echo out; echo err >&2", &id, None)
            .expect("registered");
        assert_eq!(out, "out\nerr\n");
    }

    #[test]
    fn timeout_returns_marker_and_environment_survives() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = manager(temp.path());
        let id = AgentId::new("1-abc");
        sandbox.create(&id).expect("create");

        let started = Instant::now();
        let out = sandbox
            .run("sleep 30", &id, Some(Duration::from_millis(300)))
            .expect("registered");
        assert!(out.starts_with("Timeout error"), "{out}");
        assert!(started.elapsed() < Duration::from_secs(10));

        let out = sandbox.run("echo still-here", &id, None).expect("registered");
        assert_eq!(out.trim(), "still-here");
    }

    #[test]
    fn timeout_applies_to_large_unread_command_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = manager(temp.path());
        let id = AgentId::new("1-abc");
        sandbox.create(&id).expect("create");

        let command = format!("sleep 30\n#{}", "x".repeat(300_000));
        let started = Instant::now();
        let out = sandbox
            .run(&command, &id, Some(Duration::from_secs(1)))
            .expect("registered");
        assert!(out.starts_with("Timeout error"), "{out}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn requested_timeout_is_capped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = manager(temp.path());
        sandbox.config.max_timeout_secs = 1;
        let id = AgentId::new("1-abc");
        sandbox.create(&id).expect("create");

        let started = Instant::now();
        let out = sandbox
            .run("sleep 30", &id, Some(Duration::from_secs(u64::MAX)))
            .expect("registered");
        assert_eq!(out, "Timeout error: Command terminated after 1 seconds.");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn files_persist_but_shell_state_does_not() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = manager(temp.path());
        let id = AgentId::new("1-abc");
        sandbox.create(&id).expect("create");

        sandbox
            .run("echo kept > note.txt; export HIVE_VAR=1; mkdir sub; cd sub", &id, None)
            .expect("registered");
        let out = sandbox
            .run("cat note.txt; echo \"var=${HIVE_VAR:-unset}\"; basename \"$PWD\"", &id, None)
            .expect("registered");
        assert_eq!(out, "kept\nvar=unset\n1-abc\n");
    }

    #[test]
    fn destroy_releases_environment() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = manager(temp.path());
        let id = AgentId::new("1-abc");
        sandbox.create(&id).expect("create");
        assert!(sandbox.destroy(&id));
        assert!(!sandbox.destroy(&id));
        assert_eq!(sandbox.run("echo hi", &id, None), None);
    }

    #[test]
    fn prelude_runs_before_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = manager(temp.path());
        sandbox.config.prelude = "PRE=capped".to_string();
        let id = AgentId::new("1-abc");
        sandbox.create(&id).expect("create");
        let out = sandbox.run("echo $PRE", &id, None).expect("registered");
        assert_eq!(out.trim(), "capped");
    }

    #[test]
    fn health_check_requires_ok_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sandbox = manager(temp.path());
        let report = sandbox.health_check().expect("healthy");
        assert_eq!(report.echo, "OK");

        sandbox.config.network_check = "echo NOT OK".to_string();
        let err = sandbox.health_check().unwrap_err();
        assert!(err.to_string().contains("network"));
        assert!(!sandbox.is_registered(&AgentId::new(HEALTH_PROBE_ID)));
    }
}
