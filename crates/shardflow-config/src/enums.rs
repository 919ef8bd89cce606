use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared output names shared between producers and consumers.
pub mod outputs {
  pub const WORKSPACE: &str = "workspace";
  pub const RAW: &str = "raw";
  pub const VCF: &str = "vcf";
  pub const SITES_ONLY: &str = "sites_only";
  pub const MERGED: &str = "merged";
}

/// The kind of work a task performs.
///
/// Kinds are the unit for per-kind concurrency limits and disk tiering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  /// Batched import of one shard's units.
  Import,
  /// Raw conversion of an imported shard.
  Convert,
  /// Flat genotyping of a whole shard (branch B).
  Genotype,
  /// Genotyping of one sub-shard inside the nested scatter (branch A).
  SubGenotype,
  /// Reduces a shard's sub-shards back into one artifact (branch A).
  SubGather,
  /// Filtering plus sites-only extraction.
  Filter,
  /// Whole-run gather of sites-only filtered artifacts.
  GatherSitesOnly,
  /// Whole-run gather of unfiltered per-shard artifacts.
  GatherUnfiltered,
  /// Whole-run gather of raw-conversion artifacts.
  GatherRaw,
}

impl TaskKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskKind::Import => "import",
      TaskKind::Convert => "convert",
      TaskKind::Genotype => "genotype",
      TaskKind::SubGenotype => "sub_genotype",
      TaskKind::SubGather => "sub_gather",
      TaskKind::Filter => "filter",
      TaskKind::GatherSitesOnly => "gather_sites_only",
      TaskKind::GatherUnfiltered => "gather_unfiltered",
      TaskKind::GatherRaw => "gather_raw",
    }
  }

  /// Output names a task of this kind must produce.
  pub fn declared_outputs(&self) -> &'static [&'static str] {
    match self {
      TaskKind::Import => &[outputs::WORKSPACE],
      TaskKind::Convert => &[outputs::RAW],
      TaskKind::Genotype | TaskKind::SubGenotype | TaskKind::SubGather => &[outputs::VCF],
      TaskKind::Filter => &[outputs::VCF, outputs::SITES_ONLY],
      TaskKind::GatherSitesOnly | TaskKind::GatherUnfiltered | TaskKind::GatherRaw => {
        &[outputs::MERGED]
      }
    }
  }

  /// Gather kinds are order-preserving merges run by the engine itself.
  pub fn is_gather(&self) -> bool {
    matches!(
      self,
      TaskKind::SubGather
        | TaskKind::GatherSitesOnly
        | TaskKind::GatherUnfiltered
        | TaskKind::GatherRaw
    )
  }

  pub fn disk_tier(&self) -> DiskTier {
    match self {
      TaskKind::SubGenotype | TaskKind::Convert => DiskTier::Small,
      TaskKind::Genotype | TaskKind::SubGather | TaskKind::Filter => DiskTier::Medium,
      TaskKind::Import
      | TaskKind::GatherSitesOnly
      | TaskKind::GatherUnfiltered
      | TaskKind::GatherRaw => DiskTier::Large,
    }
  }
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskTier {
  Small,
  Medium,
  Large,
}
