//! Routes tasks to the external executor or to in-process gathers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shardflow_gather::{
  GatherError, GatherReducer, GatheredArtifact, MergeError, OutputAssembler, ShardResult,
};
use shardflow_graph::{ArtifactRef, TaskId, TaskKind, outputs};
use shardflow_task_executor::{ExecutorError, TaskExecutor, TaskInput, TaskOutput};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Name under which gathers receive their shard slots.
const GATHER_INPUTS: &str = "inputs";

/// A [`TaskExecutor`] that runs gather kinds itself and forwards every other
/// kind to an external executor.
///
/// Completed gathers are kept so the engine can report which shards went
/// into each merged artifact.
pub struct StageRouter {
  external: Arc<dyn TaskExecutor>,
  reducer: GatherReducer,
  gathered: Mutex<BTreeMap<TaskId, GatheredArtifact>>,
}

impl StageRouter {
  pub fn new(external: Arc<dyn TaskExecutor>, reducer: GatherReducer) -> Self {
    Self {
      external,
      reducer,
      gathered: Mutex::new(BTreeMap::new()),
    }
  }

  /// The gather result recorded for `task_id`, if it ran to completion.
  pub fn gathered(&self, task_id: &TaskId) -> Option<GatheredArtifact> {
    self
      .gathered
      .lock()
      .ok()
      .and_then(|gathered| gathered.get(task_id).cloned())
  }

  #[instrument(name = "gather_stage", skip(self, input), fields(task_id = %input.task_id))]
  async fn gather(&self, input: &TaskInput) -> Result<TaskOutput, ExecutorError> {
    let slots = input.shards(GATHER_INPUTS).ok_or_else(|| {
      ExecutorError::permanent(format!("gather '{}' has no shard inputs", input.task_id))
    })?;

    let output_name = gathered_output(input.kind);
    let mut results = Vec::with_capacity(slots.len());
    for slot in slots {
      let artifact = OutputAssembler::resolve(slot.shard_index, &slot.by_branch).map_err(|e| {
        ExecutorError::Invariant {
          message: e.to_string(),
        }
      })?;
      // Sub-shard artifacts carry their parent shard's index; the slot
      // index is the sub-partition.
      let artifact = match input.kind {
        TaskKind::SubGather => ArtifactRef::shard(slot.shard_index, artifact.uri),
        _ => artifact,
      };
      results.push(ShardResult::new(slot.shard_index).with(output_name, artifact));
    }

    debug!(slots = results.len(), output_name, "resolved gather inputs");

    let gathered = self
      .reducer
      .reduce_as(input.task_id.as_str(), &results, output_name)
      .await
      .map_err(classify)?;

    let merged = match input.shard_index {
      Some(index) => ArtifactRef::shard(index, gathered.artifact.uri.clone()),
      None => gathered.artifact.clone(),
    };
    let declared = input.kind.declared_outputs().first().copied().ok_or_else(|| {
      ExecutorError::Invariant {
        message: format!("gather kind '{}' declares no output", input.kind),
      }
    })?;

    if let Ok(mut recorded) = self.gathered.lock() {
      recorded.insert(input.task_id.clone(), gathered);
    }

    Ok(TaskOutput::new().with(declared, merged))
  }
}

#[async_trait]
impl TaskExecutor for StageRouter {
  async fn invoke(
    &self,
    input: &TaskInput,
    cancel: CancellationToken,
  ) -> Result<TaskOutput, ExecutorError> {
    if input.kind.is_gather() {
      if cancel.is_cancelled() {
        return Err(ExecutorError::Cancelled);
      }
      return self.gather(input).await;
    }
    self.external.invoke(input, cancel).await
  }
}

/// The per-shard output a gather kind merges.
fn gathered_output(kind: TaskKind) -> &'static str {
  match kind {
    TaskKind::GatherSitesOnly => outputs::SITES_ONLY,
    TaskKind::GatherRaw => outputs::RAW,
    _ => outputs::VCF,
  }
}

/// I/O trouble while merging is worth a retry; a malformed gather is not.
fn classify(error: GatherError) -> ExecutorError {
  match error {
    GatherError::Merge {
      source: MergeError::Io(_),
      ..
    } => ExecutorError::transient(error.to_string()),
    GatherError::Assemble(_) => ExecutorError::Invariant {
      message: error.to_string(),
    },
    other => ExecutorError::permanent(other.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use shardflow_gather::Merger;
  use shardflow_graph::BranchTag;
  use shardflow_task_executor::{ResolvedParam, ShardCandidates};

  use super::*;

  struct JoinMerger;

  #[async_trait]
  impl Merger for JoinMerger {
    async fn merge(&self, label: &str, artifacts: &[ArtifactRef]) -> Result<ArtifactRef, MergeError> {
      let uris: Vec<&str> = artifacts.iter().map(|a| a.uri.as_str()).collect();
      Ok(ArtifactRef::merged(format!("{}={}", label, uris.join("+"))))
    }
  }

  struct Unreachable;

  #[async_trait]
  impl TaskExecutor for Unreachable {
    async fn invoke(
      &self,
      _input: &TaskInput,
      _cancel: CancellationToken,
    ) -> Result<TaskOutput, ExecutorError> {
      Err(ExecutorError::permanent("external executor called"))
    }
  }

  fn router() -> StageRouter {
    StageRouter::new(
      Arc::new(Unreachable),
      GatherReducer::new(Arc::new(JoinMerger)),
    )
  }

  fn slot(index: usize, nested: Option<ArtifactRef>, flat: Option<ArtifactRef>) -> ShardCandidates {
    ShardCandidates {
      shard_index: index,
      by_branch: BTreeMap::from([(BranchTag::NestedScatter, nested), (BranchTag::Flat, flat)]),
    }
  }

  fn gather_input(kind: TaskKind, shard_index: Option<usize>, slots: Vec<ShardCandidates>) -> TaskInput {
    TaskInput {
      execution_id: "exec".to_string(),
      task_id: TaskId::new(kind, shard_index, None),
      kind,
      shard_index,
      sub_index: None,
      branch: None,
      attempt: 1,
      disk_gb: 300,
      timeout_ms: None,
      params: BTreeMap::from([(GATHER_INPUTS.to_string(), ResolvedParam::Shards(slots))]),
    }
  }

  #[tokio::test]
  async fn test_top_level_gather_orders_by_shard() {
    let router = router();
    let input = gather_input(
      TaskKind::GatherUnfiltered,
      None,
      vec![
        slot(1, Some(ArtifactRef::shard(1, "b")), None),
        slot(0, None, Some(ArtifactRef::shard(0, "a"))),
      ],
    );

    let output = router.invoke(&input, CancellationToken::new()).await.unwrap();
    assert_eq!(
      output.get(outputs::MERGED),
      Some(&ArtifactRef::merged("gather_unfiltered=a+b"))
    );

    let gathered = router.gathered(&input.task_id).unwrap();
    assert_eq!(gathered.shard_indices, vec![0, 1]);
    assert_eq!(gathered.output_name, outputs::VCF);
  }

  #[tokio::test]
  async fn test_sub_gather_stamps_parent_shard() {
    let router = router();
    let input = gather_input(
      TaskKind::SubGather,
      Some(3),
      vec![
        slot(0, Some(ArtifactRef::shard(3, "x0")), None),
        slot(1, Some(ArtifactRef::shard(3, "x1")), None),
      ],
    );

    let output = router.invoke(&input, CancellationToken::new()).await.unwrap();
    assert_eq!(
      output.get(outputs::VCF),
      Some(&ArtifactRef::shard(3, "shard0003/sub_gather=x0+x1"))
    );
  }

  #[tokio::test]
  async fn test_two_producers_violate_invariant() {
    let input = gather_input(
      TaskKind::GatherRaw,
      None,
      vec![slot(
        0,
        Some(ArtifactRef::shard(0, "a")),
        Some(ArtifactRef::shard(0, "b")),
      )],
    );

    let err = router().invoke(&input, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Invariant { .. }));
  }

  #[tokio::test]
  async fn test_missing_shard_is_permanent() {
    let input = gather_input(
      TaskKind::GatherRaw,
      None,
      vec![
        slot(0, None, Some(ArtifactRef::shard(0, "a"))),
        slot(2, None, Some(ArtifactRef::shard(2, "c"))),
      ],
    );

    let err = router().invoke(&input, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Permanent { .. }));
  }

  #[tokio::test]
  async fn test_other_kinds_go_to_external_executor() {
    let mut input = gather_input(TaskKind::Import, Some(0), Vec::new());
    input.params.clear();

    let err = router().invoke(&input, CancellationToken::new()).await.unwrap_err();
    assert_eq!(err, ExecutorError::permanent("external executor called"));
  }
}
