//! Task execution for shardflow.
//!
//! This crate defines the [`TaskExecutor`] seam through which the scheduler
//! invokes external tools, the [`TaskInput`] handed to each invocation, and
//! the [`ExecutorError`] classification that drives retries.
//!
//! [`ProcessExecutor`] is a ready-made executor that runs one process per
//! task.

mod error;
mod executor;
mod input;
mod process;

pub use error::ExecutorError;
pub use executor::TaskExecutor;
pub use input::{ResolvedParam, ShardCandidates, TaskInput, TaskOutput};
pub use process::{ProcessExecutor, TEMPFAIL_EXIT_CODE};
