//! Shardflow Config
//!
//! This crate contains the serializable run configuration for shardflow.
//! A [`RunConfig`] carries only the values that influence how a run is
//! partitioned, wired and scheduled: sizing input, partition count knobs,
//! the branch-selection flag, concurrency limits, retry budget, timeouts and
//! disk tiers forwarded to executors.
//!
//! Configuration is loaded from JSON (via the CLI) and validated with
//! [`RunConfig::validate`] before anything is built.

mod disk;
mod enums;
mod error;
mod run;

pub use disk::DiskTiers;
pub use enums::{DiskTier, TaskKind, outputs};
pub use error::ConfigError;
pub use run::RunConfig;
