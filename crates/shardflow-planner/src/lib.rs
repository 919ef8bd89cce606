//! Partition planning.
//!
//! [`PartitionPlanner`] decides how many shards a run fans out to and wraps
//! each group produced by a [`Splitter`] as a [`PartitionDescriptor`].
//! Planning is deterministic: identical inputs give identical descriptors.

mod error;
mod planner;
mod splitter;

pub use error::PlanError;
pub use planner::{PartitionPlanner, partition_count};
pub use splitter::{BalancedSplitter, Splitter};
