//! Hive configuration stored under `.hive/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::role::Role;

pub const DEFAULT_CONFIG_PATH: &str = ".hive/config.toml";

/// Hive configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that run against a local `sh`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HiveConfig {
    /// Consecutive idle turns after which an agent is nudged by its superior.
    pub idle_nudge_threshold: u32,

    /// Rendered prompt budget. Oldest chat entries are left out beyond it.
    pub prompt_budget_bytes: usize,

    pub root: RootConfig,
    pub model: ModelConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RootConfig {
    /// `general` or `manager`.
    pub role: Role,
    pub label: String,
    pub task: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    /// Adapter command. Receives a JSON request on stdin, prints a JSON reply.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Total attempts per invocation, including the first.
    pub max_attempts: u32,
    /// Linear backoff unit between attempts.
    pub retry_backoff_ms: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Shell argv that reads command text from stdin. `{workdir}` is replaced
    /// with the agent's working directory.
    pub shell: Vec<String>,
    /// Parent of the per-agent working directories.
    pub workspace_dir: PathBuf,
    /// Resource caps prepended to every command.
    pub prelude: String,
    pub default_timeout_secs: u64,
    /// Upper bound on any per-command timeout, including model-requested overrides.
    pub max_timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Startup probe for basic command execution. Must print `OK`.
    pub echo_check: String,
    /// Startup probe for outbound network access. Must print `OK`.
    pub network_check: String,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            idle_nudge_threshold: 7,
            prompt_budget_bytes: 60_000,
            root: RootConfig::default(),
            model: ModelConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            role: Role::General,
            label: "Team Lead".to_string(),
            task: "Execute the user's orders".to_string(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            command: vec!["hive-model".to_string()],
            timeout_secs: 5 * 60,
            max_attempts: 3,
            retry_backoff_ms: 500,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            shell: vec!["sh".to_string()],
            workspace_dir: PathBuf::from("workspace"),
            prelude: "ulimit -t 600".to_string(),
            default_timeout_secs: 120,
            max_timeout_secs: 600,
            output_limit_bytes: 100_000,
            echo_check: "echo OK".to_string(),
            network_check:
                "ping -c 1 -W 1 8.8.8.8 > /dev/null 2>&1 && echo OK || echo NOT OK".to_string(),
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl SandboxConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// Resolve a requested timeout: the default when absent, never above `max_timeout_secs`.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or_else(|| self.default_timeout())
            .min(Duration::from_secs(self.max_timeout_secs))
    }
}

impl HiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.idle_nudge_threshold == 0 {
            return Err(anyhow!("idle_nudge_threshold must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if !matches!(self.root.role, Role::General | Role::Manager) {
            return Err(anyhow!("root.role must be general or manager"));
        }
        if self.model.command.is_empty() || self.model.command[0].trim().is_empty() {
            return Err(anyhow!("model.command must be a non-empty array"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        if self.model.max_attempts == 0 {
            return Err(anyhow!("model.max_attempts must be > 0"));
        }
        if self.model.output_limit_bytes == 0 {
            return Err(anyhow!("model.output_limit_bytes must be > 0"));
        }
        if self.sandbox.shell.is_empty() || self.sandbox.shell[0].trim().is_empty() {
            return Err(anyhow!("sandbox.shell must be a non-empty array"));
        }
        if self.sandbox.default_timeout_secs == 0 {
            return Err(anyhow!("sandbox.default_timeout_secs must be > 0"));
        }
        if self.sandbox.max_timeout_secs < self.sandbox.default_timeout_secs {
            return Err(anyhow!(
                "sandbox.max_timeout_secs must be >= sandbox.default_timeout_secs"
            ));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HiveConfig::default()`.
pub fn load_config(path: &Path) -> Result<HiveConfig> {
    if !path.exists() {
        let cfg = HiveConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HiveConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &HiveConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
