use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::disk::DiskTiers;
use crate::enums::TaskKind;
use crate::error::ConfigError;

/// Configuration for a single scatter-gather run.
///
/// # Example
///
/// ```json
/// {
///   "sizing_input": 4000,
///   "use_nested_scatter": true,
///   "max_concurrency": 64,
///   "task_concurrency": { "import": 8 },
///   "retry_budget": 2
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
  /// Scalar that drives the partition count (e.g. sample count).
  pub sizing_input: u64,

  #[serde(default = "default_scale_factor")]
  pub scale_factor: f64,

  /// Floor applied to computed partition counts. Overrides bypass it.
  #[serde(default = "default_min_partition_count")]
  pub min_partition_count: usize,

  /// Explicit partition count, trusted verbatim.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub partition_count_override: Option<usize>,

  /// Selects the nested-scatter branch when true, the flat branch otherwise.
  #[serde(default)]
  pub use_nested_scatter: bool,

  /// Fan-out of the nested scatter. Fixed, not derived from the outer count.
  #[serde(default = "default_sub_partition_count")]
  pub sub_partition_count: usize,

  /// Run-wide cap on tasks in flight.
  #[serde(default = "default_max_concurrency")]
  pub max_concurrency: usize,

  /// Optional per-kind caps, applied on top of `max_concurrency`.
  #[serde(default)]
  pub task_concurrency: BTreeMap<TaskKind, usize>,

  /// Retries allowed per task after its first attempt.
  #[serde(default = "default_retry_budget")]
  pub retry_budget: u32,

  /// Stop dispatching after the first permanent task failure. Off by
  /// default: independent shards keep running.
  #[serde(default)]
  pub fail_fast: bool,

  /// Wall-clock budget per task attempt.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub task_timeout_ms: Option<u64>,

  #[serde(default)]
  pub disk: DiskTiers,

  /// Batch size handed to the import stage; executors size themselves on it.
  #[serde(default = "default_import_batch_size")]
  pub import_batch_size: u32,
}

impl RunConfig {
  /// A configuration with every default applied.
  pub fn new(sizing_input: u64) -> Self {
    Self {
      sizing_input,
      scale_factor: default_scale_factor(),
      min_partition_count: default_min_partition_count(),
      partition_count_override: None,
      use_nested_scatter: false,
      sub_partition_count: default_sub_partition_count(),
      max_concurrency: default_max_concurrency(),
      task_concurrency: BTreeMap::new(),
      retry_budget: default_retry_budget(),
      fail_fast: false,
      task_timeout_ms: None,
      disk: DiskTiers::default(),
      import_batch_size: default_import_batch_size(),
    }
  }

  /// Parse and validate a JSON configuration.
  pub fn from_json(input: &str) -> Result<Self, ConfigError> {
    let config: RunConfig = serde_json::from_str(input)?;
    config.validate()?;
    Ok(config)
  }

  /// Reject values that would make planning or scheduling meaningless.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_concurrency == 0 {
      return Err(ConfigError::ZeroConcurrency);
    }
    if let Some((kind, _)) = self.task_concurrency.iter().find(|(_, limit)| **limit == 0) {
      return Err(ConfigError::ZeroKindLimit {
        kind: kind.to_string(),
      });
    }
    if !self.scale_factor.is_finite() || self.scale_factor < 0.0 {
      return Err(ConfigError::InvalidScaleFactor(self.scale_factor));
    }
    if self.min_partition_count == 0 {
      return Err(ConfigError::ZeroMinPartitions);
    }
    if self.sub_partition_count == 0 {
      return Err(ConfigError::ZeroSubPartitions);
    }
    Ok(())
  }
}

fn default_scale_factor() -> f64 {
  0.15
}

fn default_min_partition_count() -> usize {
  2
}

fn default_sub_partition_count() -> usize {
  10
}

fn default_max_concurrency() -> usize {
  16
}

fn default_retry_budget() -> u32 {
  3
}

fn default_import_batch_size() -> u32 {
  50
}
