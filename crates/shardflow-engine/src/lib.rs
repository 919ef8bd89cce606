//! Shardflow Engine
//!
//! Runs the whole pipeline for one input set:
//!
//! ```text
//! units ──► PartitionPlanner ──► TaskGraphBuilder ──► Scheduler
//!                                                        │
//!                    ┌───────────────────────────────────┤
//!                    ▼                                   ▼
//!            external TaskExecutor          StageRouter (gather kinds)
//!            (import, convert, ...)         OutputAssembler + GatherReducer
//! ```
//!
//! Gather stages never leave the process: the engine resolves each shard's
//! producer, orders shards by index and merges through a
//! [`Merger`](shardflow_gather::Merger). Everything else is handed to the
//! configured [`TaskExecutor`](shardflow_task_executor::TaskExecutor).

mod engine;
mod error;
mod outputs;
mod pipeline;
mod router;

pub use engine::RunEngine;
pub use error::EngineError;
pub use outputs::{RunOutcome, RunOutputs};
pub use pipeline::Pipeline;
pub use router::StageRouter;
