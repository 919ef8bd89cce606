use shardflow_graph::{BranchTag, GraphError};
use shardflow_planner::PlanError;
use thiserror::Error;

/// Errors that can occur while building a task graph.
#[derive(Debug, Error)]
pub enum BuildError {
  /// Branches of a group do not share an output contract.
  #[error("branch '{branch}' declares outputs {found:?}, expected {expected:?}")]
  IncompatibleBranches {
    branch: BranchTag,
    expected: Vec<String>,
    found: Vec<String>,
  },

  #[error("a branch group needs at least two alternatives, got {0}")]
  TooFewBranches(usize),

  #[error("branch '{0}' appears more than once in the branch group")]
  DuplicateBranch(BranchTag),

  #[error("branch '{0}' is not part of the branch group")]
  UnknownBranch(BranchTag),

  #[error("shard index {0} appears in more than one partition")]
  DuplicateShard(usize),

  #[error("shard index {0} has no partition; indices must run from 0 without gaps")]
  MissingShard(usize),

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Graph(#[from] GraphError),
}
