//! Task input and output types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shardflow_graph::{ArtifactRef, BranchTag, TaskId, TaskKind};

/// One gather slot after upstream resolution.
///
/// Every branch tag is present; branches that produced nothing map to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardCandidates {
  pub shard_index: usize,
  pub by_branch: BTreeMap<BranchTag, Option<ArtifactRef>>,
}

/// A task parameter with upstream references replaced by artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResolvedParam {
  Literal(serde_json::Value),
  Artifact(ArtifactRef),
  Shards(Vec<ShardCandidates>),
}

/// Input required to execute one attempt of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInput {
  /// Execution ID this task belongs to.
  pub execution_id: String,
  pub task_id: TaskId,
  pub kind: TaskKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub shard_index: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sub_index: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub branch: Option<BranchTag>,
  /// 1-based attempt number.
  pub attempt: u32,
  /// Disk size requested for this task's tier.
  pub disk_gb: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  pub params: BTreeMap<String, ResolvedParam>,
}

impl TaskInput {
  pub fn shards(&self, name: &str) -> Option<&[ShardCandidates]> {
    match self.params.get(name) {
      Some(ResolvedParam::Shards(slots)) => Some(slots),
      _ => None,
    }
  }
}

/// Artifacts produced by a successful task, keyed by declared output name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
  pub artifacts: BTreeMap<String, ArtifactRef>,
}

impl TaskOutput {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, artifact: ArtifactRef) -> Self {
    self.artifacts.insert(name.into(), artifact);
    self
  }

  pub fn get(&self, name: &str) -> Option<&ArtifactRef> {
    self.artifacts.get(name)
  }
}
