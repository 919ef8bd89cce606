//! Task execution errors.

/// Errors an executor can report for one task attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
  /// Failure worth retrying (preemption, flaky infrastructure).
  #[error("transient failure: {message}")]
  Transient { message: String },

  /// Failure that will not go away on retry.
  #[error("permanent failure: {message}")]
  Permanent { message: String },

  /// The attempt exceeded its wall-clock budget.
  #[error("task timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// The attempt was cancelled.
  #[error("task cancelled")]
  Cancelled,

  /// An internal invariant was violated. Aborts the whole run.
  #[error("internal invariant violated: {message}")]
  Invariant { message: String },
}

impl ExecutorError {
  pub fn transient(message: impl Into<String>) -> Self {
    ExecutorError::Transient {
      message: message.into(),
    }
  }

  pub fn permanent(message: impl Into<String>) -> Self {
    ExecutorError::Permanent {
      message: message.into(),
    }
  }

  /// Whether the attempt may be retried against the task's budget.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      ExecutorError::Transient { .. } | ExecutorError::Timeout { .. }
    )
  }
}
