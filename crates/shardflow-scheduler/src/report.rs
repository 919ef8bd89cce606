//! Run results.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use shardflow_graph::{TaskGraph, TaskId};
use shardflow_task_executor::TaskOutput;

/// Lifecycle state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
  Pending,
  Ready,
  Running,
  Succeeded,
  Failed,
  /// An upstream node failed; this node was never dispatched.
  Skipped,
  /// In flight or not yet dispatched when the run was cancelled.
  Cancelled,
}

impl NodeState {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      NodeState::Succeeded | NodeState::Failed | NodeState::Skipped | NodeState::Cancelled
    )
  }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Succeeded,
  /// At least one node did not succeed and no further progress was possible.
  Failed,
  Cancelled,
}

/// Final record of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutcome {
  pub state: NodeState,
  /// Attempts dispatched, including the first.
  pub attempts: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output: Option<TaskOutput>,
  /// Last error seen, for failed nodes or nodes that succeeded after a retry.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// One dispatch of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
  pub sequence: u64,
  pub task_id: TaskId,
  pub attempt: u32,
  /// Dependencies the coordinator saw as Succeeded at dispatch time.
  pub satisfied: Vec<TaskId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
  Succeeded,
  Retrying,
  Failed,
  Cancelled,
}

/// One attempt result as applied by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
  pub sequence: u64,
  pub task_id: TaskId,
  pub attempt: u32,
  pub outcome: AttemptOutcome,
}

/// Result of a complete run.
///
/// `dispatch_log` and `completion_log` share one sequence counter, so
/// their entries are totally ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  pub execution_id: String,
  pub status: RunStatus,
  pub nodes: BTreeMap<TaskId, NodeOutcome>,
  pub dispatch_log: Vec<DispatchRecord>,
  pub completion_log: Vec<CompletionRecord>,
}

impl RunReport {
  pub fn state(&self, task_id: &TaskId) -> Option<NodeState> {
    self.nodes.get(task_id).map(|outcome| outcome.state)
  }

  pub fn output(&self, task_id: &TaskId) -> Option<&TaskOutput> {
    self.nodes.get(task_id).and_then(|outcome| outcome.output.as_ref())
  }

  pub fn count(&self, state: NodeState) -> usize {
    self
      .nodes
      .values()
      .filter(|outcome| outcome.state == state)
      .count()
  }

  pub fn tasks_in(&self, state: NodeState) -> Vec<&TaskId> {
    self
      .nodes
      .iter()
      .filter(|(_, outcome)| outcome.state == state)
      .map(|(id, _)| id)
      .collect()
  }

  /// Dispatches that happened before every dependency had succeeded.
  ///
  /// Checked against the completion log rather than the `satisfied` field,
  /// so it does not trust the coordinator's own bookkeeping. Empty for a
  /// correct run.
  pub fn dependency_violations(&self, graph: &TaskGraph) -> Vec<&DispatchRecord> {
    let succeeded_at: HashMap<&TaskId, u64> = self
      .completion_log
      .iter()
      .filter(|record| record.outcome == AttemptOutcome::Succeeded)
      .map(|record| (&record.task_id, record.sequence))
      .collect();

    self
      .dispatch_log
      .iter()
      .filter(|record| {
        let Some(node) = graph.get(&record.task_id) else {
          return true;
        };
        node.dependencies.iter().any(|dependency| {
          succeeded_at
            .get(dependency)
            .is_none_or(|sequence| *sequence > record.sequence)
        })
      })
      .collect()
  }
}
