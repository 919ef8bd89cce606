use serde::{Deserialize, Serialize};

use crate::enums::DiskTier;

/// Disk sizes (GB) requested from executors per tier.
///
/// Opaque to the scheduler; forwarded verbatim in each task's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskTiers {
  #[serde(default = "default_small")]
  pub small_gb: u32,
  #[serde(default = "default_medium")]
  pub medium_gb: u32,
  #[serde(default = "default_large")]
  pub large_gb: u32,
}

impl DiskTiers {
  pub fn size_for(&self, tier: DiskTier) -> u32 {
    match tier {
      DiskTier::Small => self.small_gb,
      DiskTier::Medium => self.medium_gb,
      DiskTier::Large => self.large_gb,
    }
  }
}

impl Default for DiskTiers {
  fn default() -> Self {
    Self {
      small_gb: default_small(),
      medium_gb: default_medium(),
      large_gb: default_large(),
    }
  }
}

fn default_small() -> u32 {
  100
}

fn default_medium() -> u32 {
  200
}

fn default_large() -> u32 {
  300
}
