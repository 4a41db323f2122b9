//! Test-only helpers: scripted models and hive fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tempfile::TempDir;

use crate::core::error::ModelError;
use crate::core::types::{ModelReply, ModelRequest, ToolCall};
use crate::hive::Hive;
use crate::io::config::HiveConfig;
use crate::io::model::Model;

static NEXT_CALL: AtomicUsize = AtomicUsize::new(1);

/// Model that replays queued outcomes in order and records every request.
///
/// Once the queue is empty it answers with an empty reply (no text, no
/// tool calls).
#[derive(Debug, Default)]
pub struct ScriptedModel {
    outcomes: RefCell<VecDeque<Result<ModelReply, ModelError>>>,
    requests: RefCell<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self::with_outcomes(replies.into_iter().map(Ok).collect())
    }

    pub fn with_outcomes(outcomes: Vec<Result<ModelReply, ModelError>>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: ModelReply) {
        self.outcomes.borrow_mut().push_back(Ok(reply));
    }

    pub fn push_error(&self, err: ModelError) {
        self.outcomes.borrow_mut().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.outcomes.borrow().len()
    }
}

impl Model for ScriptedModel {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        self.requests.borrow_mut().push(request.clone());
        self.outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(ModelReply::default()))
    }
}

/// Tool call with a fresh correlation id.
pub fn call(name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        correlation_id: format!("call-{}", NEXT_CALL.fetch_add(1, Ordering::Relaxed)),
        name: name.to_string(),
        arguments,
    }
}

/// Config for tests: host `sh`, no resource prelude, short timeouts and no
/// retry backoff.
pub fn test_config(workspace: &Path) -> HiveConfig {
    let mut config = HiveConfig::default();
    config.model.max_attempts = 3;
    config.model.retry_backoff_ms = 0;
    config.model.timeout_secs = 10;
    config.sandbox.shell = vec!["sh".to_string()];
    config.sandbox.workspace_dir = workspace.to_path_buf();
    config.sandbox.prelude = String::new();
    config.sandbox.default_timeout_secs = 10;
    config.sandbox.echo_check = "echo OK".to_string();
    config.sandbox.network_check = "echo OK".to_string();
    config
}

/// A hive over a fresh temporary workspace. Keep the `TempDir` alive for
/// the duration of the test.
pub fn test_hive<M: Model>(model: M) -> (TempDir, Hive<M>) {
    let temp = tempfile::tempdir().expect("tempdir");
    let hive = Hive::new(test_config(temp.path()), model).expect("hive");
    (temp, hive)
}
