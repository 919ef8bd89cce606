use shardflow_graph::Unit;
use tracing::warn;

/// The partitioning primitive.
///
/// Implementations split `units` into `count` roughly balanced groups,
/// preserving relative order within and across groups.
pub trait Splitter: Send + Sync {
  fn split(&self, units: &[Unit], count: usize) -> Vec<Vec<Unit>>;
}

/// Contiguous, size-balanced split.
///
/// Group sizes differ by at most one, with the larger groups first. The
/// count is capped at the number of units so no group is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedSplitter;

impl Splitter for BalancedSplitter {
  fn split(&self, units: &[Unit], count: usize) -> Vec<Vec<Unit>> {
    if units.is_empty() || count == 0 {
      return Vec::new();
    }

    let groups = if count > units.len() {
      warn!(
        requested = count,
        units = units.len(),
        "partition count exceeds unit count, capping"
      );
      units.len()
    } else {
      count
    };

    let base = units.len() / groups;
    let extra = units.len() % groups;

    let mut result = Vec::with_capacity(groups);
    let mut start = 0;
    for group in 0..groups {
      let size = base + usize::from(group < extra);
      result.push(units[start..start + size].to_vec());
      start += size;
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn units(n: usize) -> Vec<Unit> {
    (0..n).map(|i| format!("interval-{i:03}")).collect()
  }

  #[test]
  fn test_balanced_sizes() {
    let groups = BalancedSplitter.split(&units(10), 3);
    let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 3, 3]);
  }

  #[test]
  fn test_preserves_order() {
    let input = units(17);
    let groups = BalancedSplitter.split(&input, 5);
    let flattened: Vec<Unit> = groups.into_iter().flatten().collect();
    assert_eq!(flattened, input);
  }

  #[test]
  fn test_caps_at_unit_count() {
    let groups = BalancedSplitter.split(&units(3), 8);
    assert_eq!(groups.len(), 3);
    assert!(groups.iter().all(|g| g.len() == 1));
  }
}
