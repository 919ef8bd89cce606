//! Shardflow Gather
//!
//! Turns per-shard outputs into whole-run artifacts:
//!
//! - [`OutputAssembler`] picks the single active branch's artifact for a
//!   shard, treating anything other than exactly one as a construction defect
//! - [`GatherReducer`] sorts shard results by index, checks none are
//!   missing or duplicated, and hands the ordered artifacts to a [`Merger`]
//!
//! Merging is order-sensitive. Shards are always merged in ascending index
//! order regardless of the order in which they completed.

mod assembler;
mod error;
mod merger;
mod reducer;

pub use assembler::OutputAssembler;
pub use error::{AssembleError, GatherError, MergeError};
pub use merger::{ConcatMerger, Merger};
pub use reducer::{GatherReducer, GatheredArtifact, ShardResult};
