//! Model-invocation boundary.
//!
//! The [`Model`] trait decouples turn logic from the language-model backend.
//! [`CommandModel`] talks to an out-of-process adapter over JSON; tests use
//! scripted models that return predetermined replies without spawning
//! processes.

use std::io::ErrorKind;
use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::core::error::ModelError;
use crate::core::types::{ModelReply, ModelRequest};
use crate::io::config::ModelConfig;
use crate::io::process::run_command_with_timeout;

/// Abstraction over model backends.
pub trait Model {
    /// Invoke the model with a prompt and a bound tool set.
    fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError>;
}

impl<M: Model + ?Sized> Model for &M {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        (**self).invoke(request)
    }
}

/// Bounded retry for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Sleep `backoff * attempt` after each failed attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

/// Invoke `model`, retrying transport failures up to the policy's bound.
///
/// `Unavailable` is returned immediately. When every attempt fails with a
/// transport error the result is `RetriesExhausted`.
#[instrument(skip_all, fields(agent = %request.agent_id, peer = %request.peer_id))]
pub fn invoke_with_retry<M: Model>(
    model: &M,
    request: &ModelRequest,
    policy: RetryPolicy,
) -> Result<ModelReply, ModelError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last = String::new();
    for attempt in 1..=max_attempts {
        match model.invoke(request) {
            Ok(reply) => {
                debug!(attempt, tool_calls = reply.tool_calls.len(), "model replied");
                return Ok(reply);
            }
            Err(ModelError::Transport(msg)) => {
                warn!(attempt, max_attempts, err = %msg, "model transport failure");
                last = msg;
                if attempt < max_attempts && !policy.backoff.is_zero() {
                    thread::sleep(policy.backoff * attempt);
                }
            }
            Err(other) => return Err(other),
        }
    }
    Err(ModelError::RetriesExhausted {
        attempts: max_attempts,
        last,
    })
}

/// Model backed by an external adapter command.
///
/// The request is written to the adapter's stdin as JSON; the adapter must
/// print a [`ModelReply`] as JSON on stdout and exit zero.
#[derive(Debug, Clone)]
pub struct CommandModel {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Model for CommandModel {
    #[instrument(skip_all, fields(agent = %request.agent_id, timeout_secs = self.timeout.as_secs()))]
    fn invoke(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(ModelError::Unavailable("empty model command".to_string()));
        };
        let payload = serde_json::to_vec(request)
            .map_err(|e| ModelError::Transport(format!("serialize request: {e}")))?;

        let mut cmd = Command::new(program);
        cmd.args(args);

        let output = match run_command_with_timeout(
            cmd,
            Some(&payload),
            self.timeout,
            self.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                let unavailable = err
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| {
                        matches!(io.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied)
                    });
                let msg = format!("{program}: {err:#}");
                return Err(if unavailable {
                    ModelError::Unavailable(msg)
                } else {
                    ModelError::Transport(msg)
                });
            }
        };

        if output.timed_out {
            return Err(ModelError::Transport(format!(
                "{program} timed out after {:?}",
                self.timeout
            )));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ModelError::Transport(format!(
                "{program} failed with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }
        if output.stdout_truncated > 0 {
            return Err(ModelError::Transport(format!(
                "{program} reply exceeded {} bytes",
                self.output_limit_bytes
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ModelError::Transport(format!("parse {program} reply: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::AgentId;
    use std::cell::Cell;

    fn request() -> ModelRequest {
        ModelRequest {
            agent_id: AgentId::new("1-abc"),
            peer_id: AgentId::new("user"),
            messages: Vec::new(),
            tools: Vec::new(),
        }
    }

    struct FlakyModel {
        failures_left: Cell<u32>,
        calls: Cell<u32>,
    }

    impl Model for FlakyModel {
        fn invoke(&self, _request: &ModelRequest) -> Result<ModelReply, ModelError> {
            self.calls.set(self.calls.get() + 1);
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(ModelError::Transport("connection reset".to_string()));
            }
            Ok(ModelReply::text("hello"))
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn retry_recovers_from_transient_failures() {
        let model = FlakyModel {
            failures_left: Cell::new(2),
            calls: Cell::new(0),
        };
        let reply = invoke_with_retry(&model, &request(), policy(3)).expect("reply");
        assert_eq!(reply.text.as_deref(), Some("hello"));
        assert_eq!(model.calls.get(), 3);
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let model = FlakyModel {
            failures_left: Cell::new(10),
            calls: Cell::new(0),
        };
        let err = invoke_with_retry(&model, &request(), policy(3)).unwrap_err();
        assert_eq!(
            err,
            ModelError::RetriesExhausted {
                attempts: 3,
                last: "connection reset".to_string()
            }
        );
        assert_eq!(model.calls.get(), 3);
    }

    #[test]
    fn unavailable_is_not_retried() {
        struct Down(Cell<u32>);
        impl Model for Down {
            fn invoke(&self, _request: &ModelRequest) -> Result<ModelReply, ModelError> {
                self.0.set(self.0.get() + 1);
                Err(ModelError::Unavailable("no backend".to_string()))
            }
        }
        let model = Down(Cell::new(0));
        let err = invoke_with_retry(&model, &request(), policy(5)).unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(_)));
        assert_eq!(model.0.get(), 1);
    }

    fn command_model(command: &[&str]) -> CommandModel {
        CommandModel::new(&ModelConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 5,
            ..ModelConfig::default()
        })
    }

    #[cfg(unix)]
    #[test]
    fn command_model_parses_adapter_reply() {
        let model = command_model(&[
            "sh",
            "-c",
            r#"cat > /dev/null; echo '{"text":"hi","tool_calls":[{"id":"c1","name":"sleep_through_turn","arguments":{}}]}'"#,
        ]);
        let reply = model.invoke(&request()).expect("reply");
        assert_eq!(reply.text.as_deref(), Some("hi"));
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].correlation_id, "c1");
    }

    #[cfg(unix)]
    #[test]
    fn command_model_receives_request_json() {
        let model = command_model(&[
            "sh",
            "-c",
            r#"grep -q '"agent_id":"1-abc"' && echo '{"text":"seen"}'"#,
        ]);
        let reply = model.invoke(&request()).expect("reply");
        assert_eq!(reply.text.as_deref(), Some("seen"));
    }

    #[cfg(unix)]
    #[test]
    fn command_model_failure_is_transport() {
        let model = command_model(&["sh", "-c", "cat > /dev/null; exit 3"]);
        let err = model.invoke(&request()).unwrap_err();
        assert!(matches!(err, ModelError::Transport(_)), "{err}");
    }

    #[test]
    fn missing_adapter_is_unavailable() {
        let model = command_model(&["definitely-not-a-real-model-adapter"]);
        let err = model.invoke(&request()).unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(_)), "{err}");
    }
}
