use std::sync::Arc;

use shardflow_graph::{PartitionDescriptor, Unit};
use tracing::{debug, info};

use crate::error::PlanError;
use crate::splitter::{BalancedSplitter, Splitter};

/// Number of shards for a run.
///
/// An override is trusted verbatim. Otherwise `round(scale_factor * sizing_input)`
/// is raised to `min_count`, since a count of one degrades the downstream
/// partitioning into a no-op.
pub fn partition_count(
  sizing_input: u64,
  override_count: Option<usize>,
  scale_factor: f64,
  min_count: usize,
) -> usize {
  match override_count {
    Some(count) => count,
    None => {
      let scaled = (scale_factor * sizing_input as f64).round();
      let scaled = if scaled.is_finite() && scaled > 0.0 {
        scaled as usize
      } else {
        0
      };
      scaled.max(min_count)
    }
  }
}

/// Computes shard counts and wraps the splitter's groups as descriptors.
#[derive(Clone)]
pub struct PartitionPlanner {
  splitter: Arc<dyn Splitter>,
}

impl PartitionPlanner {
  pub fn new(splitter: Arc<dyn Splitter>) -> Self {
    Self { splitter }
  }

  /// Plan partitions for a run.
  pub fn plan(
    &self,
    sizing_input: u64,
    raw_units: &[Unit],
    override_count: Option<usize>,
    scale_factor: f64,
    min_count: usize,
  ) -> Result<Vec<PartitionDescriptor>, PlanError> {
    let count = partition_count(sizing_input, override_count, scale_factor, min_count);
    info!(
      sizing_input,
      override_count = ?override_count,
      partition_count = count,
      units = raw_units.len(),
      "planning partitions"
    );
    self.split_into(raw_units, count)
  }

  /// Split units into exactly-requested groups (capped at the unit count).
  ///
  /// Used directly for secondary scatters whose granularity is fixed.
  pub fn split_into(
    &self,
    raw_units: &[Unit],
    count: usize,
  ) -> Result<Vec<PartitionDescriptor>, PlanError> {
    if raw_units.is_empty() {
      return Err(PlanError::EmptyInput);
    }
    if count == 0 {
      return Err(PlanError::ZeroCount);
    }

    let groups = self.splitter.split(raw_units, count);
    validate_split(raw_units, count, &groups)?;

    let descriptors: Vec<PartitionDescriptor> = groups
      .into_iter()
      .enumerate()
      .map(|(index, units)| PartitionDescriptor::new(index, units))
      .collect();

    debug!(partitions = descriptors.len(), "partitions planned");
    Ok(descriptors)
  }
}

impl Default for PartitionPlanner {
  fn default() -> Self {
    Self::new(Arc::new(BalancedSplitter))
  }
}

/// Check the splitter kept every unit, in order, across non-empty groups.
fn validate_split(units: &[Unit], count: usize, groups: &[Vec<Unit>]) -> Result<(), PlanError> {
  if groups.is_empty() || groups.len() > count {
    return Err(PlanError::Split {
      message: format!("expected up to {} groups, got {}", count, groups.len()),
    });
  }
  if groups.iter().any(Vec::is_empty) {
    return Err(PlanError::Split {
      message: "split produced an empty group".to_string(),
    });
  }
  if !groups.iter().flatten().eq(units.iter()) {
    return Err(PlanError::Split {
      message: "split did not preserve the input units in order".to_string(),
    });
  }
  Ok(())
}
