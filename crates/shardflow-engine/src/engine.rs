use std::sync::Arc;

use shardflow_config::RunConfig;
use shardflow_gather::{GatherReducer, Merger};
use shardflow_graph::{PartitionDescriptor, TaskGraph, TaskId, TaskKind, Unit};
use shardflow_planner::PartitionPlanner;
use shardflow_scheduler::{
  EventNotifier, NodeState, NoopNotifier, RunStatus, Scheduler, SchedulerConfig,
};
use shardflow_task_executor::TaskExecutor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::EngineError;
use crate::outputs::{RunOutcome, RunOutputs};
use crate::pipeline::Pipeline;
use crate::router::StageRouter;

/// Plans, builds and executes one run.
///
/// Generic over the scheduler's event notifier. Use `RunEngine::new()` for
/// an engine that discards events, or `with_notifier` to observe them.
pub struct RunEngine<N = NoopNotifier> {
  pipeline: Pipeline,
  scheduler: Scheduler<N>,
  executor: Arc<dyn TaskExecutor>,
  merger: Arc<dyn Merger>,
}

impl RunEngine<NoopNotifier> {
  pub fn new(
    config: RunConfig,
    executor: Arc<dyn TaskExecutor>,
    merger: Arc<dyn Merger>,
  ) -> Result<Self, EngineError> {
    let scheduler = Scheduler::new(SchedulerConfig::from_run_config(&config));

    Ok(Self {
      pipeline: Pipeline::new(config)?,
      scheduler,
      executor,
      merger,
    })
  }
}

impl<N: EventNotifier> RunEngine<N> {
  pub fn with_notifier<M: EventNotifier>(self, notifier: M) -> RunEngine<M> {
    RunEngine {
      pipeline: self.pipeline,
      scheduler: self.scheduler.with_notifier(notifier),
      executor: self.executor,
      merger: self.merger,
    }
  }

  /// Use a different planner for both the primary and nested scatters.
  pub fn with_planner(mut self, planner: PartitionPlanner) -> Self {
    self.pipeline = self.pipeline.with_planner(planner);
    self
  }

  pub fn config(&self) -> &RunConfig {
    self.pipeline.config()
  }

  /// Partition `units` according to the run config.
  pub fn plan(&self, units: &[Unit]) -> Result<Vec<PartitionDescriptor>, EngineError> {
    self.pipeline.plan(units)
  }

  /// Partition `units` and expand the pipeline over the partitions.
  pub fn build(
    &self,
    units: &[Unit],
  ) -> Result<(Vec<PartitionDescriptor>, TaskGraph), EngineError> {
    self.pipeline.build(units)
  }

  /// Run the pipeline over `units`.
  ///
  /// Task failures are reported in the outcome, not as `Err`. The outcome
  /// is `Failed` whenever one of the three final artifacts is missing.
  #[instrument(name = "engine_run", skip_all, fields(units = units.len()))]
  pub async fn run(
    &self,
    units: &[Unit],
    cancel: CancellationToken,
  ) -> Result<RunOutcome, EngineError> {
    let (partitions, graph) = self.build(units)?;
    info!(
      partitions = partitions.len(),
      tasks = graph.len(),
      nested_scatter = self.config().use_nested_scatter,
      "engine_started"
    );

    let router = Arc::new(StageRouter::new(
      self.executor.clone(),
      GatherReducer::new(self.merger.clone()),
    ));
    let report = self.scheduler.run(&graph, router.clone(), cancel).await?;

    let gathered = |kind: TaskKind| {
      let task_id = TaskId::new(kind, None, None);
      match report.state(&task_id) {
        Some(NodeState::Succeeded) => router.gathered(&task_id),
        _ => None,
      }
    };
    let outputs = RunOutputs {
      sites_only: gathered(TaskKind::GatherSitesOnly),
      unfiltered: gathered(TaskKind::GatherUnfiltered),
      raw: gathered(TaskKind::GatherRaw),
    };

    let status = match report.status {
      RunStatus::Cancelled => RunStatus::Cancelled,
      RunStatus::Succeeded if outputs.is_complete() => RunStatus::Succeeded,
      _ => RunStatus::Failed,
    };

    match status {
      RunStatus::Succeeded => info!(execution_id = %report.execution_id, "engine_completed"),
      RunStatus::Failed => error!(
        execution_id = %report.execution_id,
        failed = report.count(NodeState::Failed),
        skipped = report.count(NodeState::Skipped),
        "engine_failed"
      ),
      RunStatus::Cancelled => warn!(execution_id = %report.execution_id, "engine_cancelled"),
    }

    Ok(RunOutcome {
      execution_id: report.execution_id.clone(),
      status,
      partitions,
      outputs,
      report,
    })
  }
}
