use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shardflow_graph::ArtifactRef;
use tracing::{info, instrument};

use crate::error::GatherError;
use crate::merger::Merger;

/// The resolved outputs of one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardResult {
  pub shard_index: usize,
  pub outputs: BTreeMap<String, ArtifactRef>,
}

impl ShardResult {
  pub fn new(shard_index: usize) -> Self {
    Self {
      shard_index,
      outputs: BTreeMap::new(),
    }
  }

  pub fn with(mut self, name: impl Into<String>, artifact: ArtifactRef) -> Self {
    self.outputs.insert(name.into(), artifact);
    self
  }
}

/// A merged whole-run artifact and the shards that went into it, in merge order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatheredArtifact {
  pub output_name: String,
  pub artifact: ArtifactRef,
  pub shard_indices: Vec<usize>,
}

/// Merges one named output across shards in ascending shard order.
#[derive(Clone)]
pub struct GatherReducer {
  merger: Arc<dyn Merger>,
}

impl GatherReducer {
  pub fn new(merger: Arc<dyn Merger>) -> Self {
    Self { merger }
  }

  /// Reduce `output_name` across `shard_results`.
  ///
  /// Input order is irrelevant; the results are sorted by shard index and
  /// must cover `0..n` exactly once. A missing shard fails the gather rather
  /// than being skipped.
  pub async fn reduce(
    &self,
    shard_results: &[ShardResult],
    output_name: &str,
  ) -> Result<GatheredArtifact, GatherError> {
    self.reduce_as(output_name, shard_results, output_name).await
  }

  /// Like [`reduce`](Self::reduce), with an explicit label for the merged artifact.
  #[instrument(
    name = "gather_reduce",
    skip(self, shard_results),
    fields(shards = shard_results.len())
  )]
  pub async fn reduce_as(
    &self,
    label: &str,
    shard_results: &[ShardResult],
    output_name: &str,
  ) -> Result<GatheredArtifact, GatherError> {
    let ordered = order_artifacts(shard_results, output_name)?;
    let shard_indices: Vec<usize> = ordered.iter().map(|(index, _)| *index).collect();
    let artifacts: Vec<ArtifactRef> = ordered.into_iter().map(|(_, a)| a.clone()).collect();

    let artifact = self
      .merger
      .merge(label, &artifacts)
      .await
      .map_err(|source| GatherError::Merge {
        output_name: output_name.to_string(),
        source,
      })?;

    info!(
      output_name,
      artifact = %artifact,
      shards = shard_indices.len(),
      "gather_completed"
    );

    Ok(GatheredArtifact {
      output_name: output_name.to_string(),
      artifact,
      shard_indices,
    })
  }
}

/// Sort by shard index and validate coverage of `0..n`.
fn order_artifacts<'a>(
  shard_results: &'a [ShardResult],
  output_name: &str,
) -> Result<Vec<(usize, &'a ArtifactRef)>, GatherError> {
  if shard_results.is_empty() {
    return Err(GatherError::Empty {
      output_name: output_name.to_string(),
    });
  }

  let mut sorted: Vec<&ShardResult> = shard_results.iter().collect();
  sorted.sort_by_key(|result| result.shard_index);

  let mut ordered = Vec::with_capacity(sorted.len());
  for (expected, result) in sorted.into_iter().enumerate() {
    if result.shard_index < expected {
      return Err(GatherError::DuplicateShard {
        output_name: output_name.to_string(),
        shard_index: result.shard_index,
      });
    }
    if result.shard_index > expected {
      return Err(GatherError::MissingShard {
        output_name: output_name.to_string(),
        shard_index: expected,
      });
    }

    let artifact = result
      .outputs
      .get(output_name)
      .ok_or_else(|| GatherError::MissingOutput {
        output_name: output_name.to_string(),
        shard_index: result.shard_index,
      })?;
    if let Some(tagged) = artifact.shard_index {
      if tagged != result.shard_index {
        return Err(GatherError::ShardMismatch {
          shard_index: result.shard_index,
          tagged,
        });
      }
    }

    ordered.push((result.shard_index, artifact));
  }

  Ok(ordered)
}
