//! Scheduler lifecycle events and notifiers.
//!
//! The scheduler reports every state change through an [`EventNotifier`] in
//! addition to its `tracing` events, so callers can persist progress or
//! stream it elsewhere.

use serde::{Deserialize, Serialize};
use shardflow_graph::TaskId;
use tokio::sync::mpsc;

use crate::report::RunStatus;

/// Events emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
  RunStarted {
    execution_id: String,
    tasks: usize,
  },

  TaskDispatched {
    execution_id: String,
    task_id: TaskId,
    attempt: u32,
  },

  TaskSucceeded {
    execution_id: String,
    task_id: TaskId,
    attempt: u32,
  },

  /// A retryable failure; the task goes back to the ready queue.
  TaskRetrying {
    execution_id: String,
    task_id: TaskId,
    attempt: u32,
    error: String,
  },

  TaskFailed {
    execution_id: String,
    task_id: TaskId,
    attempt: u32,
    error: String,
  },

  /// Never dispatched because an upstream task failed.
  TaskSkipped {
    execution_id: String,
    task_id: TaskId,
    failed_upstream: TaskId,
  },

  RunFinished {
    execution_id: String,
    status: RunStatus,
  },
}

/// Receives scheduler events.
///
/// Called from the coordinator loop, so implementations must not block.
pub trait EventNotifier: Send + Sync {
  fn notify(&self, event: SchedulerEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
  fn notify(&self, _event: SchedulerEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<SchedulerEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
    Self { sender }
  }
}

impl EventNotifier for ChannelNotifier {
  fn notify(&self, event: SchedulerEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
