//! Process-backed task executor.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use minijinja::Environment;
use shardflow_graph::ArtifactRef;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::ExecutorError;
use crate::executor::TaskExecutor;
use crate::input::{TaskInput, TaskOutput};

/// Exit code (`EX_TEMPFAIL`) a tool uses to ask for a retry.
pub const TEMPFAIL_EXIT_CODE: i32 = 75;

/// Runs one process per task.
///
/// Arguments are minijinja templates rendered against the task input, e.g.
/// `--interval={{ shard_index }}` or `--disk={{ disk_gb }}`. The full
/// [`TaskInput`] is written to stdin as JSON; the process must print a JSON
/// object mapping output names to URIs on stdout.
///
/// Exit code [`TEMPFAIL_EXIT_CODE`] is reported as transient, any other
/// non-zero exit as permanent.
pub struct ProcessExecutor {
  program: PathBuf,
  args: Vec<String>,
  env: Environment<'static>,
}

impl ProcessExecutor {
  pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      args,
      env: Environment::new(),
    }
  }

  fn render_args(&self, input: &TaskInput) -> Result<Vec<String>, ExecutorError> {
    let context = serde_json::to_value(input).map_err(|e| {
      ExecutorError::permanent(format!("failed to serialize task input: {}", e))
    })?;

    self
      .args
      .iter()
      .map(|template| {
        self.env.render_str(template, &context).map_err(|e| {
          ExecutorError::permanent(format!("failed to render argument '{}': {}", template, e))
        })
      })
      .collect()
  }

  fn parse_output(input: &TaskInput, stdout: &[u8]) -> Result<TaskOutput, ExecutorError> {
    let uris: BTreeMap<String, String> = serde_json::from_slice(stdout)
      .map_err(|e| ExecutorError::permanent(format!("invalid output JSON: {}", e)))?;

    let artifacts = uris
      .into_iter()
      .map(|(name, uri)| {
        let artifact = match input.shard_index {
          Some(index) => ArtifactRef::shard(index, uri),
          None => ArtifactRef::merged(uri),
        };
        (name, artifact)
      })
      .collect();

    Ok(TaskOutput { artifacts })
  }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
  #[instrument(
    name = "process_invoke",
    skip(self, input, cancel),
    fields(task_id = %input.task_id, attempt = input.attempt)
  )]
  async fn invoke(
    &self,
    input: &TaskInput,
    cancel: CancellationToken,
  ) -> Result<TaskOutput, ExecutorError> {
    if cancel.is_cancelled() {
      return Err(ExecutorError::Cancelled);
    }

    let args = self.render_args(input)?;
    debug!(program = %self.program.display(), args = ?args, "spawning task process");

    let mut child = Command::new(&self.program)
      .args(&args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| {
        ExecutorError::permanent(format!(
          "failed to spawn '{}': {}",
          self.program.display(),
          e
        ))
      })?;

    let payload = serde_json::to_vec(input)
      .map_err(|e| ExecutorError::permanent(format!("failed to serialize task input: {}", e)))?;
    if let Some(mut stdin) = child.stdin.take() {
      match stdin.write_all(&payload).await {
        Ok(()) => {}
        // The tool may legitimately ignore its input.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Err(e) => {
          return Err(ExecutorError::transient(format!(
            "failed to write task input: {}",
            e
          )));
        }
      }
    }

    let output = tokio::select! {
      output = child.wait_with_output() => output
        .map_err(|e| ExecutorError::transient(format!("failed to wait for process: {}", e)))?,
      _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
    };

    if output.status.success() {
      return Self::parse_output(input, &output.stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = format!(
      "'{}' exited with {}: {}",
      self.program.display(),
      output.status,
      stderr.trim()
    );
    warn!(error = %message, "task process failed");

    match output.status.code() {
      Some(TEMPFAIL_EXIT_CODE) => Err(ExecutorError::Transient { message }),
      _ => Err(ExecutorError::Permanent { message }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use shardflow_graph::{TaskId, TaskKind};

  fn input() -> TaskInput {
    TaskInput {
      execution_id: "exec-1".to_string(),
      task_id: TaskId::new(TaskKind::Convert, Some(4), None),
      kind: TaskKind::Convert,
      shard_index: Some(4),
      sub_index: None,
      branch: None,
      attempt: 1,
      disk_gb: 100,
      timeout_ms: None,
      params: BTreeMap::new(),
    }
  }

  fn sh(script: &str) -> ProcessExecutor {
    ProcessExecutor::new("sh", vec!["-c".to_string(), script.to_string()])
  }

  #[tokio::test]
  async fn test_renders_arguments_and_parses_output() {
    let executor = sh(r#"cat > /dev/null; echo '{"raw": "/data/{{ kind }}-{{ shard_index }}.raw"}'"#);

    let output = executor
      .invoke(&input(), CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(
      output.get("raw"),
      Some(&ArtifactRef::shard(4, "/data/convert-4.raw"))
    );
  }

  #[tokio::test]
  async fn test_task_input_on_stdin() {
    let executor = sh(r#"grep -q '"task_id":"shard0004/convert"' && echo '{"raw": "ok"}'"#);

    let output = executor
      .invoke(&input(), CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(output.get("raw").map(|a| a.uri.as_str()), Some("ok"));
  }

  #[tokio::test]
  async fn test_tempfail_is_transient() {
    let err = sh("exit 75")
      .invoke(&input(), CancellationToken::new())
      .await
      .unwrap_err();
    assert!(err.is_retryable());
  }

  #[tokio::test]
  async fn test_other_exit_is_permanent() {
    let err = sh("echo boom >&2; exit 3")
      .invoke(&input(), CancellationToken::new())
      .await
      .unwrap_err();

    match err {
      ExecutorError::Permanent { message } => assert!(message.contains("boom")),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn test_invalid_stdout_is_permanent() {
    let err = sh("echo not-json")
      .invoke(&input(), CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, ExecutorError::Permanent { .. }));
  }

  #[tokio::test]
  async fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = sh("sleep 5").invoke(&input(), cancel).await.unwrap_err();
    assert_eq!(err, ExecutorError::Cancelled);
  }

  #[tokio::test]
  async fn test_cancel_kills_running_process() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(std::time::Duration::from_millis(50)).await;
      trigger.cancel();
    });

    let err = sh("sleep 30").invoke(&input(), cancel).await.unwrap_err();
    assert_eq!(err, ExecutorError::Cancelled);
  }
}
