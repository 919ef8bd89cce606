use shardflow_builder::TaskGraphBuilder;
use shardflow_config::RunConfig;
use shardflow_graph::{PartitionDescriptor, TaskGraph, Unit};
use shardflow_planner::PartitionPlanner;

use crate::error::EngineError;

/// Planning and graph construction for a validated run config.
///
/// Needs no executor, so it can describe a run without performing it.
#[derive(Clone)]
pub struct Pipeline {
  config: RunConfig,
  planner: PartitionPlanner,
  builder: TaskGraphBuilder,
}

impl Pipeline {
  pub fn new(config: RunConfig) -> Result<Self, EngineError> {
    config.validate()?;

    Ok(Self {
      planner: PartitionPlanner::default(),
      builder: TaskGraphBuilder::new(&config),
      config,
    })
  }

  /// Use a different planner for both the primary and nested scatters.
  pub fn with_planner(mut self, planner: PartitionPlanner) -> Self {
    self.builder = self.builder.with_planner(planner.clone());
    self.planner = planner;
    self
  }

  pub fn config(&self) -> &RunConfig {
    &self.config
  }

  /// Partition `units` according to the run config.
  pub fn plan(&self, units: &[Unit]) -> Result<Vec<PartitionDescriptor>, EngineError> {
    Ok(self.planner.plan(
      self.config.sizing_input,
      units,
      self.config.partition_count_override,
      self.config.scale_factor,
      self.config.min_partition_count,
    )?)
  }

  /// Partition `units` and expand the pipeline over the partitions.
  pub fn build(
    &self,
    units: &[Unit],
  ) -> Result<(Vec<PartitionDescriptor>, TaskGraph), EngineError> {
    let partitions = self.plan(units)?;
    let graph = self
      .builder
      .build(&partitions, self.config.use_nested_scatter)?;
    Ok((partitions, graph))
  }
}
