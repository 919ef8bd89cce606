use serde::{Deserialize, Serialize};
use shardflow_gather::GatheredArtifact;
use shardflow_graph::PartitionDescriptor;
use shardflow_scheduler::{RunReport, RunStatus};

/// The three whole-run artifacts. A gather that did not complete is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutputs {
  pub sites_only: Option<GatheredArtifact>,
  pub unfiltered: Option<GatheredArtifact>,
  pub raw: Option<GatheredArtifact>,
}

impl RunOutputs {
  pub fn is_complete(&self) -> bool {
    self.sites_only.is_some() && self.unfiltered.is_some() && self.raw.is_some()
  }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
  pub execution_id: String,
  /// `Succeeded` only when every final artifact was produced.
  pub status: RunStatus,
  pub partitions: Vec<PartitionDescriptor>,
  pub outputs: RunOutputs,
  pub report: RunReport,
}
