use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::try_join_all;
use shardflow_graph::ArtifactRef;
use tokio::io::AsyncWriteExt;

use crate::error::MergeError;

/// The merge primitive: order-sensitive concatenation.
#[async_trait]
pub trait Merger: Send + Sync {
  /// Merge `artifacts` in the given order into one artifact named after `label`.
  async fn merge(&self, label: &str, artifacts: &[ArtifactRef]) -> Result<ArtifactRef, MergeError>;
}

/// Concatenates file artifacts byte-for-byte into an output directory.
///
/// Labels containing `/` are flattened to `--`.
pub struct ConcatMerger {
  out_dir: PathBuf,
}

impl ConcatMerger {
  pub fn new(out_dir: impl Into<PathBuf>) -> Self {
    Self {
      out_dir: out_dir.into(),
    }
  }
}

#[async_trait]
impl Merger for ConcatMerger {
  async fn merge(&self, label: &str, artifacts: &[ArtifactRef]) -> Result<ArtifactRef, MergeError> {
    if artifacts.is_empty() {
      return Err(MergeError::Rejected {
        message: "no artifacts to merge".to_string(),
      });
    }

    // Every part must exist before the output is touched.
    try_join_all(
      artifacts
        .iter()
        .map(|artifact| tokio::fs::metadata(&artifact.uri)),
    )
    .await?;

    tokio::fs::create_dir_all(&self.out_dir).await?;
    let name = label.replace('/', "--");
    let path = self.out_dir.join(&name);
    let partial = self.out_dir.join(format!("{name}.partial"));

    if let Err(e) = concat(&partial, artifacts).await {
      let _ = tokio::fs::remove_file(&partial).await;
      return Err(e);
    }
    tokio::fs::rename(&partial, &path).await?;

    Ok(ArtifactRef::merged(path.to_string_lossy().into_owned()))
  }
}

/// Copies parts into `path` one at a time, holding a single input open.
async fn concat(path: &Path, artifacts: &[ArtifactRef]) -> Result<(), MergeError> {
  let mut out = tokio::fs::File::create(path).await?;
  for artifact in artifacts {
    let mut part = tokio::fs::File::open(&artifact.uri).await?;
    tokio::io::copy(&mut part, &mut out).await?;
  }
  out.flush().await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_concatenates_in_given_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut parts = Vec::new();
    for (index, body) in ["alpha\n", "beta\n", "gamma\n"].iter().enumerate() {
      let path = dir.path().join(format!("part-{index}"));
      std::fs::write(&path, body).unwrap();
      parts.push(ArtifactRef::shard(index, path.to_string_lossy().into_owned()));
    }

    let merger = ConcatMerger::new(dir.path().join("out"));
    let merged = merger.merge("shard0001/sub_gather", &parts).await.unwrap();

    assert!(merged.uri.ends_with("shard0001--sub_gather"));
    assert_eq!(merged.shard_index, None);
    assert_eq!(
      std::fs::read_to_string(&merged.uri).unwrap(),
      "alpha\nbeta\ngamma\n"
    );
  }

  #[tokio::test]
  async fn test_missing_part_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("present");
    std::fs::write(&present, "x").unwrap();

    let merger = ConcatMerger::new(dir.path().join("out"));
    let err = merger
      .merge(
        "out",
        &[
          ArtifactRef::shard(0, present.to_string_lossy().into_owned()),
          ArtifactRef::shard(1, "/nonexistent/part"),
        ],
      )
      .await
      .unwrap_err();
    assert!(matches!(err, MergeError::Io(_)));
    assert!(!dir.path().join("out").join("out").exists());
  }

  #[tokio::test]
  async fn test_merges_thousands_of_parts() {
    let dir = tempfile::tempdir().unwrap();
    let parts: Vec<ArtifactRef> = (0..3000)
      .map(|index| {
        let path = dir.path().join(format!("part-{index:05}"));
        std::fs::write(&path, format!("{index}\n")).unwrap();
        ArtifactRef::shard(index, path.to_string_lossy().into_owned())
      })
      .collect();

    let merged = ConcatMerger::new(dir.path().join("out"))
      .merge("gather_raw", &parts)
      .await
      .unwrap();

    let expected: String = (0..3000).map(|index| format!("{index}\n")).collect();
    assert_eq!(std::fs::read_to_string(&merged.uri).unwrap(), expected);
    assert!(!dir.path().join("out").join("gather_raw.partial").exists());
  }

  #[tokio::test]
  async fn test_empty_merge_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConcatMerger::new(dir.path())
      .merge("out", &[])
      .await
      .unwrap_err();
    assert!(matches!(err, MergeError::Rejected { .. }));
  }
}
