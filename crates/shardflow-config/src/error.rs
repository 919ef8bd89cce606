use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("max_concurrency must be at least 1")]
  ZeroConcurrency,

  #[error("concurrency limit for '{kind}' must be at least 1")]
  ZeroKindLimit { kind: String },

  #[error("scale_factor must be a finite, non-negative number, got {0}")]
  InvalidScaleFactor(f64),

  #[error("min_partition_count must be at least 1")]
  ZeroMinPartitions,

  #[error("sub_partition_count must be at least 1")]
  ZeroSubPartitions,

  #[error("failed to parse run configuration: {0}")]
  Parse(#[from] serde_json::Error),
}
