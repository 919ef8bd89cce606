use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use shardflow_graph::{
  BranchTag, OutputRef, ParamValue, PartitionDescriptor, ShardSource, TaskGraph, TaskId, TaskKind,
  TaskNode, outputs,
};
use shardflow_planner::PartitionPlanner;

use crate::builder::NodeDefaults;
use crate::error::BuildError;

/// Picks the active branch for the whole graph.
///
/// A static, build-time switch: the same tag applies to every shard.
pub struct BranchSelector;

impl BranchSelector {
  pub fn select(use_nested_scatter: bool) -> BranchTag {
    if use_nested_scatter {
      BranchTag::NestedScatter
    } else {
      BranchTag::Flat
    }
  }
}

/// Builder state handed to a branch while it expands one shard.
pub struct ShardScope<'a> {
  graph: &'a mut TaskGraph,
  partition: &'a PartitionDescriptor,
  input: OutputRef,
  branch: BranchTag,
  defaults: &'a NodeDefaults,
  planner: &'a PartitionPlanner,
}

impl<'a> ShardScope<'a> {
  pub(crate) fn new(
    graph: &'a mut TaskGraph,
    partition: &'a PartitionDescriptor,
    input: OutputRef,
    branch: BranchTag,
    defaults: &'a NodeDefaults,
    planner: &'a PartitionPlanner,
  ) -> Self {
    Self {
      graph,
      partition,
      input,
      branch,
      defaults,
      planner,
    }
  }

  pub fn partition(&self) -> &PartitionDescriptor {
    self.partition
  }

  /// The upstream output the branch consumes.
  pub fn input(&self) -> &OutputRef {
    &self.input
  }

  pub fn planner(&self) -> &PartitionPlanner {
    self.planner
  }

  /// A new node for this shard, tagged with the branch and run defaults.
  pub fn task(&self, kind: TaskKind, sub_index: Option<usize>) -> TaskNode {
    self
      .defaults
      .apply(TaskNode::new(kind, Some(self.partition.shard_index), sub_index))
      .with_branch(self.branch)
  }

  pub fn add(&mut self, node: TaskNode) -> Result<TaskId, BuildError> {
    Ok(self.graph.insert(node)?.id.clone())
  }

  pub(crate) fn kind_of(&self, task_id: &TaskId) -> Option<TaskKind> {
    self.graph.get(task_id).map(|node| node.kind)
  }
}

/// One alternative sub-pipeline of a branch group.
pub trait BranchPipeline: Send + Sync {
  fn tag(&self) -> BranchTag;

  /// Output names the branch's terminal task produces.
  fn declared_outputs(&self) -> Vec<String>;

  /// Add this branch's nodes for one shard and return the terminal task.
  fn expand(&self, scope: &mut ShardScope<'_>) -> Result<TaskId, BuildError>;
}

/// Branch A: secondary scatter over sub-shards, gathered back into one file.
#[derive(Debug, Clone)]
pub struct NestedScatterBranch {
  sub_partition_count: usize,
}

impl NestedScatterBranch {
  pub fn new(sub_partition_count: usize) -> Self {
    Self {
      sub_partition_count,
    }
  }
}

impl BranchPipeline for NestedScatterBranch {
  fn tag(&self) -> BranchTag {
    BranchTag::NestedScatter
  }

  fn declared_outputs(&self) -> Vec<String> {
    vec![outputs::VCF.to_string()]
  }

  fn expand(&self, scope: &mut ShardScope<'_>) -> Result<TaskId, BuildError> {
    let sub_partitions = scope
      .planner()
      .split_into(&scope.partition().units, self.sub_partition_count)?;

    let mut sources = Vec::with_capacity(sub_partitions.len());
    for sub in &sub_partitions {
      let node = scope
        .task(TaskKind::SubGenotype, Some(sub.shard_index))
        .with_param("units", ParamValue::literal(sub.units.clone()))
        .with_input(outputs::WORKSPACE, scope.input().clone());
      let id = scope.add(node)?;

      sources.push(ShardSource {
        shard_index: sub.shard_index,
        candidates: BTreeMap::from([(self.tag(), OutputRef::new(id, outputs::VCF))]),
      });
    }

    let gather = scope
      .task(TaskKind::SubGather, None)
      .with_shards("inputs", sources);
    scope.add(gather)
  }
}

/// Branch B: one genotyping task over the whole shard.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatBranch;

impl BranchPipeline for FlatBranch {
  fn tag(&self) -> BranchTag {
    BranchTag::Flat
  }

  fn declared_outputs(&self) -> Vec<String> {
    vec![outputs::VCF.to_string()]
  }

  fn expand(&self, scope: &mut ShardScope<'_>) -> Result<TaskId, BuildError> {
    let node = scope
      .task(TaskKind::Genotype, None)
      .with_param("units", ParamValue::literal(scope.partition().units.clone()))
      .with_input(outputs::WORKSPACE, scope.input().clone());
    scope.add(node)
  }
}

/// Mutually exclusive alternatives sharing one output contract.
#[derive(Clone)]
pub struct BranchGroup {
  branches: Vec<Arc<dyn BranchPipeline>>,
}

impl BranchGroup {
  pub fn new(branches: Vec<Arc<dyn BranchPipeline>>) -> Self {
    Self { branches }
  }

  /// The standard genotyping group: nested scatter vs. flat.
  pub fn genotyping(sub_partition_count: usize) -> Self {
    Self::new(vec![
      Arc::new(NestedScatterBranch::new(sub_partition_count)),
      Arc::new(FlatBranch),
    ])
  }

  /// Check the group has distinct alternatives with identical contracts.
  pub fn validate(&self) -> Result<Vec<String>, BuildError> {
    let Some(first) = self.branches.first() else {
      return Err(BuildError::TooFewBranches(0));
    };
    if self.branches.len() < 2 {
      return Err(BuildError::TooFewBranches(self.branches.len()));
    }

    let mut tags = BTreeSet::new();
    for branch in &self.branches {
      if !tags.insert(branch.tag()) {
        return Err(BuildError::DuplicateBranch(branch.tag()));
      }
    }

    let expected = sorted(first.declared_outputs());
    for branch in &self.branches[1..] {
      let found = sorted(branch.declared_outputs());
      if found != expected {
        return Err(BuildError::IncompatibleBranches {
          branch: branch.tag(),
          expected,
          found,
        });
      }
    }

    Ok(expected)
  }

  pub fn get(&self, tag: BranchTag) -> Result<&Arc<dyn BranchPipeline>, BuildError> {
    self
      .branches
      .iter()
      .find(|branch| branch.tag() == tag)
      .ok_or(BuildError::UnknownBranch(tag))
  }

  /// Expand the selected branch and verify its terminal honors the contract.
  pub(crate) fn expand(
    &self,
    tag: BranchTag,
    contract: &[String],
    scope: &mut ShardScope<'_>,
  ) -> Result<TaskId, BuildError> {
    let branch = self.get(tag)?;
    let terminal = branch.expand(scope)?;

    let produced: Vec<String> = scope
      .kind_of(&terminal)
      .map(|kind| {
        kind
          .declared_outputs()
          .iter()
          .map(|name| name.to_string())
          .collect()
      })
      .unwrap_or_default();
    if !contract.iter().all(|name| produced.contains(name)) {
      return Err(BuildError::IncompatibleBranches {
        branch: tag,
        expected: contract.to_vec(),
        found: sorted(produced),
      });
    }

    Ok(terminal)
  }
}

fn sorted(mut names: Vec<String>) -> Vec<String> {
  names.sort();
  names.dedup();
  names
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_selector_is_static() {
    assert_eq!(BranchSelector::select(true), BranchTag::NestedScatter);
    assert_eq!(BranchSelector::select(false), BranchTag::Flat);
  }

  #[test]
  fn test_genotyping_group_is_valid() {
    let contract = BranchGroup::genotyping(10).validate().unwrap();
    assert_eq!(contract, vec!["vcf".to_string()]);
  }

  struct MismatchedBranch;

  impl BranchPipeline for MismatchedBranch {
    fn tag(&self) -> BranchTag {
      BranchTag::Flat
    }

    fn declared_outputs(&self) -> Vec<String> {
      vec!["bcf".to_string()]
    }

    fn expand(&self, _scope: &mut ShardScope<'_>) -> Result<TaskId, BuildError> {
      unreachable!("never expanded")
    }
  }

  #[test]
  fn test_incompatible_contracts() {
    let group = BranchGroup::new(vec![
      Arc::new(NestedScatterBranch::new(4)),
      Arc::new(MismatchedBranch),
    ]);

    match group.validate() {
      Err(BuildError::IncompatibleBranches {
        branch,
        expected,
        found,
      }) => {
        assert_eq!(branch, BranchTag::Flat);
        assert_eq!(expected, vec!["vcf".to_string()]);
        assert_eq!(found, vec!["bcf".to_string()]);
      }
      other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
  }

  #[test]
  fn test_single_branch_rejected() {
    let group = BranchGroup::new(vec![Arc::new(FlatBranch)]);
    assert!(matches!(group.validate(), Err(BuildError::TooFewBranches(1))));
  }

  #[test]
  fn test_duplicate_tags_rejected() {
    let group = BranchGroup::new(vec![Arc::new(FlatBranch), Arc::new(FlatBranch)]);
    assert!(matches!(
      group.validate(),
      Err(BuildError::DuplicateBranch(BranchTag::Flat))
    ));
  }
}
