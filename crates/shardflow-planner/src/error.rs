use thiserror::Error;

/// Errors that can occur while planning partitions.
#[derive(Debug, Error)]
pub enum PlanError {
  /// There is nothing to partition.
  #[error("no partitionable units were supplied")]
  EmptyInput,

  /// A partition count of zero cannot hold any input.
  #[error("partition count must be at least 1")]
  ZeroCount,

  /// The partitioning primitive broke its contract.
  #[error("splitter returned an invalid split: {message}")]
  Split { message: String },
}
