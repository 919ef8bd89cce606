use shardflow_graph::TaskId;
use thiserror::Error;

/// Errors that abort a run as a whole.
///
/// Task failures are not errors at this level; they are recorded in the
/// [`RunReport`](crate::RunReport).
#[derive(Debug, Error)]
pub enum SchedulerError {
  #[error("invalid task graph: {message}")]
  InvalidGraph { message: String },

  #[error("max_concurrency must be at least 1")]
  InvalidConcurrency,

  #[error("concurrency limit for '{kind}' must be at least 1")]
  InvalidKindLimit { kind: String },

  #[error("task attempt panicked: {message}")]
  Join { message: String },

  #[error("internal invariant violated by '{task_id}': {message}")]
  InvariantViolated { task_id: TaskId, message: String },
}
