use serde::{Deserialize, Serialize};

/// One partitionable unit of input, e.g. an interval file path.
pub type Unit = String;

/// One shard's slice of the input. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
  pub shard_index: usize,
  pub units: Vec<Unit>,
}

impl PartitionDescriptor {
  pub fn new(shard_index: usize, units: Vec<Unit>) -> Self {
    Self { shard_index, units }
  }
}
