use shardflow_graph::BranchTag;
use thiserror::Error;

/// The branch exclusivity invariant was violated.
///
/// Never a user error: a correctly built graph always has exactly one
/// producer per shard.
#[derive(Debug, Error)]
pub enum AssembleError {
  #[error("shard {shard_index} has {present:?} branch outputs, expected exactly one")]
  AmbiguousBranch {
    shard_index: usize,
    present: Vec<BranchTag>,
  },
}

/// Errors from the merge primitive.
#[derive(Debug, Error)]
pub enum MergeError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("merge rejected: {message}")]
  Rejected { message: String },
}

#[derive(Debug, Error)]
pub enum GatherError {
  #[error("nothing to gather for '{output_name}'")]
  Empty { output_name: String },

  #[error("shard {shard_index} is missing from the '{output_name}' gather")]
  MissingShard {
    output_name: String,
    shard_index: usize,
  },

  #[error("shard {shard_index} appears more than once in the '{output_name}' gather")]
  DuplicateShard {
    output_name: String,
    shard_index: usize,
  },

  #[error("shard {shard_index} did not produce output '{output_name}'")]
  MissingOutput {
    output_name: String,
    shard_index: usize,
  },

  #[error("artifact for shard {shard_index} is tagged with shard {tagged}")]
  ShardMismatch { shard_index: usize, tagged: usize },

  #[error(transparent)]
  Assemble(#[from] AssembleError),

  #[error("merge failed for '{output_name}': {source}")]
  Merge {
    output_name: String,
    #[source]
    source: MergeError,
  },
}
