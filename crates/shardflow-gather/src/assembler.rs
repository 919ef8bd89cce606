use std::collections::BTreeMap;

use shardflow_graph::{ArtifactRef, BranchTag};

use crate::error::AssembleError;

/// Resolves the canonical artifact for a shard among branch producers.
pub struct OutputAssembler;

impl OutputAssembler {
  /// Return the one present branch output.
  ///
  /// Zero or several present outputs mean the graph was built wrong.
  pub fn resolve(
    shard_index: usize,
    branch_outputs: &BTreeMap<BranchTag, Option<ArtifactRef>>,
  ) -> Result<ArtifactRef, AssembleError> {
    let mut present = branch_outputs
      .iter()
      .filter_map(|(tag, artifact)| artifact.as_ref().map(|artifact| (*tag, artifact)));

    match (present.next(), present.next()) {
      (Some((_, artifact)), None) => Ok(artifact.clone()),
      _ => Err(AssembleError::AmbiguousBranch {
        shard_index,
        present: branch_outputs
          .iter()
          .filter(|(_, artifact)| artifact.is_some())
          .map(|(tag, _)| *tag)
          .collect(),
      }),
    }
  }
}
