//! Task graph construction.
//!
//! [`TaskGraphBuilder`] turns planned partitions into a [`TaskGraph`]:
//! one linear chain per shard with a [`BranchGroup`] between genotyping and
//! filtering, followed by three whole-run gathers.
//!
//! Branch selection happens here, once, at build time. Only the selected
//! branch contributes nodes, so the scheduler never sees branch semantics.
//!
//! [`TaskGraph`]: shardflow_graph::TaskGraph

mod branch;
mod builder;
mod error;

pub use branch::{BranchGroup, BranchPipeline, BranchSelector, FlatBranch, NestedScatterBranch, ShardScope};
pub use builder::{NodeDefaults, TaskGraphBuilder};
pub use error::BuildError;
