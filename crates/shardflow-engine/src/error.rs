use shardflow_builder::BuildError;
use shardflow_config::ConfigError;
use shardflow_planner::PlanError;
use shardflow_scheduler::SchedulerError;
use thiserror::Error;

/// Errors that prevent a run from producing a report.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("invalid run config: {0}")]
  Config(#[from] ConfigError),

  #[error("partition planning failed: {0}")]
  Plan(#[from] PlanError),

  #[error("graph construction failed: {0}")]
  Build(#[from] BuildError),

  #[error("scheduling failed: {0}")]
  Scheduler(#[from] SchedulerError),
}
