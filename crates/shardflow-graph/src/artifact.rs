use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque reference to a produced output.
///
/// Per-shard artifacts carry the index of the shard that produced them;
/// merged artifacts carry none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
  pub uri: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub shard_index: Option<usize>,
}

impl ArtifactRef {
  pub fn shard(shard_index: usize, uri: impl Into<String>) -> Self {
    Self {
      uri: uri.into(),
      shard_index: Some(shard_index),
    }
  }

  pub fn merged(uri: impl Into<String>) -> Self {
    Self {
      uri: uri.into(),
      shard_index: None,
    }
  }
}

impl fmt::Display for ArtifactRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.shard_index {
      Some(index) => write!(f, "{}#{}", self.uri, index),
      None => f.write_str(&self.uri),
    }
  }
}
