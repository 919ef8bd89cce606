//! Shardflow Scheduler
//!
//! Executes a [`TaskGraph`](shardflow_graph::TaskGraph) against a
//! [`TaskExecutor`](shardflow_task_executor::TaskExecutor).
//!
//! Each node moves through
//! `Pending -> Ready -> Running -> Succeeded | Failed`, with `Skipped` for
//! nodes downstream of a failure and `Cancelled` for nodes in flight when the
//! run is cancelled. A single coordinator owns the node table; spawned
//! attempts only report their result back to it.
//!
//! Dispatch is gated by a run-wide semaphore and optional per-kind
//! semaphores. Transient failures and timeouts are retried against each
//! node's budget. A failure only affects the nodes that depend on it;
//! independent shards run to completion.

mod error;
mod events;
mod input;
mod report;
mod scheduler;

pub use error::SchedulerError;
pub use events::{ChannelNotifier, EventNotifier, NoopNotifier, SchedulerEvent};
pub use report::{
  AttemptOutcome, CompletionRecord, DispatchRecord, NodeOutcome, NodeState, RunReport, RunStatus,
};
pub use scheduler::{Scheduler, SchedulerConfig};
