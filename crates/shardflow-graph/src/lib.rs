//! Shardflow Graph
//!
//! This crate provides the concrete task graph a run executes. A
//! [`TaskGraph`] is built once, by expanding the pipeline template over the
//! planned partitions, and is immutable afterwards.
//!
//! Invariants enforced on insertion:
//! - Node ids are unique
//! - Every dependency already exists in the graph, so insertion order is a
//!   topological order and the graph is acyclic by construction
//! - Every upstream output referenced by a parameter is a declared dependency
//!
//! Artifacts carry an explicit shard index so gathers order by index rather
//! than by naming conventions.

mod artifact;
mod error;
mod graph;
mod node;
mod partition;
mod task_graph;

pub use artifact::ArtifactRef;
pub use error::GraphError;
pub use graph::Graph;
pub use node::{BranchTag, OutputRef, ParamValue, ShardSource, TaskId, TaskNode};
pub use partition::{PartitionDescriptor, Unit};
pub use shardflow_config::{DiskTier, TaskKind, outputs};
pub use task_graph::TaskGraph;
