use std::cmp::Ordering;
use std::collections::BTreeMap;

use shardflow_config::RunConfig;
use shardflow_graph::{
  BranchTag, OutputRef, ParamValue, PartitionDescriptor, ShardSource, TaskGraph, TaskKind,
  TaskNode, outputs,
};
use shardflow_planner::{PartitionPlanner, PlanError};
use tracing::{debug, info};

use crate::branch::{BranchGroup, BranchSelector, ShardScope};
use crate::error::BuildError;

/// Per-node settings stamped on every task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeDefaults {
  pub retry_budget: u32,
  pub timeout_ms: Option<u64>,
}

impl NodeDefaults {
  pub(crate) fn apply(&self, node: TaskNode) -> TaskNode {
    node
      .with_retry_budget(self.retry_budget)
      .with_timeout_ms(self.timeout_ms)
  }
}

/// Per-shard producers feeding the three whole-run gathers.
struct ShardTerminals {
  shard_index: usize,
  sites_only: OutputRef,
  unfiltered: OutputRef,
  raw: OutputRef,
}

/// Expands the pipeline template over planned partitions.
#[derive(Clone)]
pub struct TaskGraphBuilder {
  branches: BranchGroup,
  planner: PartitionPlanner,
  defaults: NodeDefaults,
  import_batch_size: u32,
}

impl TaskGraphBuilder {
  /// A builder for the standard pipeline, configured from a run config.
  pub fn new(config: &RunConfig) -> Self {
    Self {
      branches: BranchGroup::genotyping(config.sub_partition_count),
      planner: PartitionPlanner::default(),
      defaults: NodeDefaults {
        retry_budget: config.retry_budget,
        timeout_ms: config.task_timeout_ms,
      },
      import_batch_size: config.import_batch_size,
    }
  }

  /// Use a different planner for secondary scatters.
  pub fn with_planner(mut self, planner: PartitionPlanner) -> Self {
    self.planner = planner;
    self
  }

  /// Replace the branch group placed between genotyping and filtering.
  pub fn with_branches(mut self, branches: BranchGroup) -> Self {
    self.branches = branches;
    self
  }

  /// Build the task graph for the given partitions.
  ///
  /// `use_nested_scatter` selects the branch for every shard. The other
  /// branch contributes no nodes.
  pub fn build(
    &self,
    descriptors: &[PartitionDescriptor],
    use_nested_scatter: bool,
  ) -> Result<TaskGraph, BuildError> {
    let contract = self.branches.validate()?;
    let tag = BranchSelector::select(use_nested_scatter);
    self.branches.get(tag)?;

    if descriptors.is_empty() {
      return Err(BuildError::Plan(PlanError::EmptyInput));
    }

    let mut ordered: Vec<&PartitionDescriptor> = descriptors.iter().collect();
    ordered.sort_by_key(|descriptor| descriptor.shard_index);
    // Gathers expect shard indices to be exactly 0..n.
    for (expected, descriptor) in ordered.iter().enumerate() {
      match descriptor.shard_index.cmp(&expected) {
        Ordering::Less => return Err(BuildError::DuplicateShard(descriptor.shard_index)),
        Ordering::Greater => return Err(BuildError::MissingShard(expected)),
        Ordering::Equal => {}
      }
    }

    info!(
      shards = ordered.len(),
      branch = %tag,
      "building task graph"
    );

    let mut graph = TaskGraph::new();
    let mut terminals = Vec::with_capacity(ordered.len());
    for descriptor in ordered {
      terminals.push(self.build_shard(&mut graph, descriptor, tag, &contract)?);
    }

    self.add_gathers(&mut graph, tag, &terminals)?;

    info!(
      nodes = graph.len(),
      histogram = ?graph.kind_histogram(),
      "task graph built"
    );
    Ok(graph)
  }

  /// import -> convert, import -> [branch] -> filter.
  fn build_shard(
    &self,
    graph: &mut TaskGraph,
    descriptor: &PartitionDescriptor,
    tag: BranchTag,
    contract: &[String],
  ) -> Result<ShardTerminals, BuildError> {
    let shard = Some(descriptor.shard_index);

    let import = self.defaults.apply(
      TaskNode::new(TaskKind::Import, shard, None)
        .with_param("units", ParamValue::literal(descriptor.units.clone()))
        .with_param("batch_size", ParamValue::literal(self.import_batch_size)),
    );
    let workspace = graph.insert(import)?.output(outputs::WORKSPACE);

    let convert = self.defaults.apply(
      TaskNode::new(TaskKind::Convert, shard, None).with_input(outputs::WORKSPACE, workspace.clone()),
    );
    let raw = graph.insert(convert)?.output(outputs::RAW);

    let terminal = {
      let mut scope = ShardScope::new(
        graph,
        descriptor,
        workspace,
        tag,
        &self.defaults,
        &self.planner,
      );
      self.branches.expand(tag, contract, &mut scope)?
    };
    let unfiltered = OutputRef::new(terminal, outputs::VCF);

    let filter = self.defaults.apply(
      TaskNode::new(TaskKind::Filter, shard, None).with_input(outputs::VCF, unfiltered.clone()),
    );
    let sites_only = graph.insert(filter)?.output(outputs::SITES_ONLY);

    debug!(shard_index = descriptor.shard_index, "shard subgraph built");

    Ok(ShardTerminals {
      shard_index: descriptor.shard_index,
      sites_only,
      unfiltered,
      raw,
    })
  }

  /// The three whole-run gathers, each listing shards in ascending index order.
  fn add_gathers(
    &self,
    graph: &mut TaskGraph,
    tag: BranchTag,
    terminals: &[ShardTerminals],
  ) -> Result<(), BuildError> {
    let gathers: [(TaskKind, fn(&ShardTerminals) -> &OutputRef); 3] = [
      (TaskKind::GatherSitesOnly, |t| &t.sites_only),
      (TaskKind::GatherUnfiltered, |t| &t.unfiltered),
      (TaskKind::GatherRaw, |t| &t.raw),
    ];

    for (kind, select) in gathers {
      let sources = terminals
        .iter()
        .map(|terminal| ShardSource {
          shard_index: terminal.shard_index,
          candidates: BTreeMap::from([(tag, select(terminal).clone())]),
        })
        .collect();
      let node = self
        .defaults
        .apply(TaskNode::new(kind, None, None).with_shards("inputs", sources));
      graph.insert(node)?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use shardflow_graph::TaskId;

  use super::*;
  use crate::branch::{BranchPipeline, FlatBranch};

  fn descriptors(shards: usize, units_per_shard: usize) -> Vec<PartitionDescriptor> {
    (0..shards)
      .map(|shard| {
        PartitionDescriptor::new(
          shard,
          (0..units_per_shard)
            .map(|u| format!("s{shard}-u{u}"))
            .collect(),
        )
      })
      .collect()
  }

  fn builder(sub_partitions: usize) -> TaskGraphBuilder {
    let mut config = RunConfig::new(100);
    config.sub_partition_count = sub_partitions;
    config.retry_budget = 2;
    config.task_timeout_ms = Some(60_000);
    TaskGraphBuilder::new(&config)
  }

  #[test]
  fn test_flat_branch_has_no_nested_nodes() {
    let graph = builder(4).build(&descriptors(3, 8), false).unwrap();

    assert_eq!(graph.count_branch(BranchTag::NestedScatter), 0);
    assert_eq!(graph.count_kind(TaskKind::SubGenotype), 0);
    assert_eq!(graph.count_kind(TaskKind::SubGather), 0);
    assert_eq!(graph.count_kind(TaskKind::Genotype), 3);
    assert_eq!(graph.count_branch(BranchTag::Flat), 3);
    // 3 shards x (import, convert, genotype, filter) + 3 gathers
    assert_eq!(graph.len(), 15);
  }

  #[test]
  fn test_nested_branch_has_no_flat_nodes() {
    let graph = builder(4).build(&descriptors(2, 8), true).unwrap();

    assert_eq!(graph.count_branch(BranchTag::Flat), 0);
    assert_eq!(graph.count_kind(TaskKind::Genotype), 0);
    assert_eq!(graph.count_kind(TaskKind::SubGenotype), 8);
    assert_eq!(graph.count_kind(TaskKind::SubGather), 2);
    assert_eq!(graph.count_branch(BranchTag::NestedScatter), 10);
  }

  #[test]
  fn test_sub_partition_count_is_fixed() {
    let graph = builder(3).build(&descriptors(5, 9), true).unwrap();
    assert_eq!(graph.count_kind(TaskKind::SubGenotype), 15);
  }

  #[test]
  fn test_gathers_depend_on_every_shard_in_order() {
    let graph = builder(4).build(&descriptors(4, 2), false).unwrap();

    for kind in [
      TaskKind::GatherSitesOnly,
      TaskKind::GatherUnfiltered,
      TaskKind::GatherRaw,
    ] {
      let node = graph.get(&TaskId::new(kind, None, None)).unwrap();
      let ParamValue::Shards(sources) = &node.params["inputs"] else {
        panic!("gather without shard inputs");
      };
      let indices: Vec<usize> = sources.iter().map(|s| s.shard_index).collect();
      assert_eq!(indices, vec![0, 1, 2, 3]);
      assert_eq!(node.dependencies.len(), 4);
      assert!(sources.iter().all(|s| s.candidates.len() == 1));
    }
  }

  #[test]
  fn test_out_of_order_descriptors_are_sorted() {
    let mut input = descriptors(3, 2);
    input.reverse();
    let graph = builder(2).build(&input, false).unwrap();

    let node = graph
      .get(&TaskId::new(TaskKind::GatherRaw, None, None))
      .unwrap();
    let ParamValue::Shards(sources) = &node.params["inputs"] else {
      panic!("gather without shard inputs");
    };
    assert_eq!(
      sources.iter().map(|s| s.shard_index).collect::<Vec<_>>(),
      vec![0, 1, 2]
    );
  }

  #[test]
  fn test_defaults_stamped_on_every_node() {
    let graph = builder(2).build(&descriptors(2, 4), true).unwrap();
    assert!(
      graph
        .nodes()
        .iter()
        .all(|n| n.retry_budget == 2 && n.timeout_ms == Some(60_000))
    );
  }

  #[test]
  fn test_dependencies_precede_dependents() {
    let graph = builder(3).build(&descriptors(3, 6), true).unwrap();
    for (position, node) in graph.nodes().iter().enumerate() {
      for dependency in &node.dependencies {
        assert!(graph.position(dependency).unwrap() < position);
      }
    }
  }

  #[test]
  fn test_duplicate_shard_rejected() {
    let mut input = descriptors(2, 2);
    input[1].shard_index = 0;
    assert!(matches!(
      builder(2).build(&input, false),
      Err(BuildError::DuplicateShard(0))
    ));
  }

  #[test]
  fn test_gap_in_shard_indices_rejected() {
    let mut input = descriptors(3, 2);
    input.remove(1);
    assert!(matches!(
      builder(2).build(&input, false),
      Err(BuildError::MissingShard(1))
    ));

    let mut shifted = descriptors(2, 2);
    for descriptor in &mut shifted {
      descriptor.shard_index += 1;
    }
    assert!(matches!(
      builder(2).build(&shifted, true),
      Err(BuildError::MissingShard(0))
    ));
  }

  #[test]
  fn test_empty_descriptors_rejected() {
    assert!(matches!(
      builder(2).build(&[], false),
      Err(BuildError::Plan(PlanError::EmptyInput))
    ));
  }

  struct SitesOnlyBranch;

  impl BranchPipeline for SitesOnlyBranch {
    fn tag(&self) -> BranchTag {
      BranchTag::NestedScatter
    }

    fn declared_outputs(&self) -> Vec<String> {
      vec![outputs::SITES_ONLY.to_string()]
    }

    fn expand(&self, _scope: &mut ShardScope<'_>) -> Result<shardflow_graph::TaskId, BuildError> {
      unreachable!("rejected before expansion")
    }
  }

  #[test]
  fn test_incompatible_branch_group_fails_build() {
    let builder = builder(2).with_branches(BranchGroup::new(vec![
      Arc::new(SitesOnlyBranch),
      Arc::new(FlatBranch),
    ]));

    assert!(matches!(
      builder.build(&descriptors(2, 2), false),
      Err(BuildError::IncompatibleBranches { .. })
    ));
  }
}
