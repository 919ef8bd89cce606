use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use shardflow_config::TaskKind;

/// Identifies one of the mutually exclusive sub-pipelines of a branch group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchTag {
  /// Branch A: secondary scatter over sub-shards followed by a gather.
  NestedScatter,
  /// Branch B: a single task over the whole shard.
  Flat,
}

impl BranchTag {
  pub const ALL: [BranchTag; 2] = [BranchTag::NestedScatter, BranchTag::Flat];

  pub fn as_str(&self) -> &'static str {
    match self {
      BranchTag::NestedScatter => "nested_scatter",
      BranchTag::Flat => "flat",
    }
  }
}

impl fmt::Display for BranchTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Unique task identity within a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
  /// Builds the canonical id for a task, e.g. `shard0003/sub_genotype.07`.
  pub fn new(kind: TaskKind, shard_index: Option<usize>, sub_index: Option<usize>) -> Self {
    let mut id = String::new();
    if let Some(shard) = shard_index {
      id.push_str(&format!("shard{:04}/", shard));
    }
    id.push_str(kind.as_str());
    if let Some(sub) = sub_index {
      id.push_str(&format!(".{:02}", sub));
    }
    Self(id)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for TaskId {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A named output of an upstream task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
  pub task: TaskId,
  pub output: String,
}

impl OutputRef {
  pub fn new(task: TaskId, output: impl Into<String>) -> Self {
    Self {
      task,
      output: output.into(),
    }
  }
}

/// One gather input slot: the producers that may supply a shard's artifact,
/// keyed by the branch that owns them.
///
/// A correctly built graph lists exactly one producer per slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSource {
  pub shard_index: usize,
  pub candidates: BTreeMap<BranchTag, OutputRef>,
}

/// A task parameter: a literal, or a reference to upstream output(s).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
  Literal(serde_json::Value),
  Output(OutputRef),
  /// Ordered gather inputs, one slot per shard.
  Shards(Vec<ShardSource>),
}

impl ParamValue {
  pub fn literal(value: impl Into<serde_json::Value>) -> Self {
    ParamValue::Literal(value.into())
  }

  /// Every upstream output this parameter reads.
  pub fn references(&self) -> Vec<&OutputRef> {
    match self {
      ParamValue::Literal(_) => Vec::new(),
      ParamValue::Output(output) => vec![output],
      ParamValue::Shards(sources) => sources
        .iter()
        .flat_map(|source| source.candidates.values())
        .collect(),
    }
  }
}

/// A concrete task instance in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
  pub id: TaskId,
  pub kind: TaskKind,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub shard_index: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sub_index: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub branch: Option<BranchTag>,
  pub params: BTreeMap<String, ParamValue>,
  pub dependencies: Vec<TaskId>,
  /// Retries allowed after the first attempt.
  pub retry_budget: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

impl TaskNode {
  pub fn new(kind: TaskKind, shard_index: Option<usize>, sub_index: Option<usize>) -> Self {
    Self {
      id: TaskId::new(kind, shard_index, sub_index),
      kind,
      shard_index,
      sub_index,
      branch: None,
      params: BTreeMap::new(),
      dependencies: Vec::new(),
      retry_budget: 0,
      timeout_ms: None,
    }
  }

  pub fn with_branch(mut self, branch: BranchTag) -> Self {
    self.branch = Some(branch);
    self
  }

  pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
    self.params.insert(name.into(), value);
    self
  }

  /// Adds a parameter reading an upstream output and records the dependency.
  pub fn with_input(self, name: impl Into<String>, output: OutputRef) -> Self {
    let task = output.task.clone();
    self
      .with_param(name, ParamValue::Output(output))
      .depends_on(task)
  }

  /// Adds ordered gather inputs and records every producer as a dependency.
  pub fn with_shards(mut self, name: impl Into<String>, sources: Vec<ShardSource>) -> Self {
    for source in &sources {
      for candidate in source.candidates.values() {
        self = self.depends_on(candidate.task.clone());
      }
    }
    self.with_param(name, ParamValue::Shards(sources))
  }

  pub fn depends_on(mut self, task: TaskId) -> Self {
    if !self.dependencies.contains(&task) {
      self.dependencies.push(task);
    }
    self
  }

  pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
    self.retry_budget = retry_budget;
    self
  }

  pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
    self.timeout_ms = timeout_ms;
    self
  }

  pub fn output(&self, name: impl Into<String>) -> OutputRef {
    OutputRef::new(self.id.clone(), name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_task_id_format() {
    assert_eq!(
      TaskId::new(TaskKind::Import, Some(3), None).as_str(),
      "shard0003/import"
    );
    assert_eq!(
      TaskId::new(TaskKind::SubGenotype, Some(12), Some(7)).as_str(),
      "shard0012/sub_genotype.07"
    );
    assert_eq!(
      TaskId::new(TaskKind::GatherRaw, None, None).as_str(),
      "gather_raw"
    );
  }

  #[test]
  fn test_with_shards_records_each_producer_once() {
    let a = TaskId::from("a");
    let sources = vec![
      ShardSource {
        shard_index: 0,
        candidates: BTreeMap::from([(BranchTag::Flat, OutputRef::new(a.clone(), "vcf"))]),
      },
      ShardSource {
        shard_index: 1,
        candidates: BTreeMap::from([(BranchTag::Flat, OutputRef::new(a.clone(), "sites_only"))]),
      },
    ];

    let node = TaskNode::new(TaskKind::GatherUnfiltered, None, None).with_shards("inputs", sources);

    assert_eq!(node.dependencies, vec![a]);
    assert_eq!(node.params["inputs"].references().len(), 2);
  }
}
