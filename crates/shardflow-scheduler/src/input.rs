//! Input resolution for dispatch.

use std::collections::{BTreeMap, HashMap};

use shardflow_graph::{BranchTag, OutputRef, ParamValue, ShardSource, TaskId, TaskNode};
use shardflow_task_executor::{ResolvedParam, ShardCandidates, TaskOutput};

/// Replace upstream references in `node`'s params with produced artifacts.
///
/// Plain references must resolve. Shard slots list every branch tag, with
/// `None` for branches that have no producer or produced nothing; choosing
/// among them is left to the consumer.
pub(crate) fn resolve_params(
  node: &TaskNode,
  outputs: &HashMap<TaskId, TaskOutput>,
) -> Result<BTreeMap<String, ResolvedParam>, String> {
  node
    .params
    .iter()
    .map(|(name, value)| {
      let resolved = match value {
        ParamValue::Literal(value) => ResolvedParam::Literal(value.clone()),
        ParamValue::Output(reference) => {
          let artifact = lookup(reference, outputs).ok_or_else(|| {
            format!(
              "param '{}' references missing output '{}' of '{}'",
              name, reference.output, reference.task
            )
          })?;
          ResolvedParam::Artifact(artifact)
        }
        ParamValue::Shards(sources) => ResolvedParam::Shards(
          sources
            .iter()
            .map(|source| resolve_slot(source, outputs))
            .collect(),
        ),
      };
      Ok((name.clone(), resolved))
    })
    .collect()
}

fn resolve_slot(source: &ShardSource, outputs: &HashMap<TaskId, TaskOutput>) -> ShardCandidates {
  let by_branch = BranchTag::ALL
    .iter()
    .map(|tag| {
      let artifact = source
        .candidates
        .get(tag)
        .and_then(|reference| lookup(reference, outputs));
      (*tag, artifact)
    })
    .collect();

  ShardCandidates {
    shard_index: source.shard_index,
    by_branch,
  }
}

fn lookup(
  reference: &OutputRef,
  outputs: &HashMap<TaskId, TaskOutput>,
) -> Option<shardflow_graph::ArtifactRef> {
  outputs
    .get(&reference.task)
    .and_then(|output| output.get(&reference.output))
    .cloned()
}

#[cfg(test)]
mod tests {
  use shardflow_graph::{ArtifactRef, TaskKind, outputs};

  use super::*;

  #[test]
  fn test_resolves_literals_and_outputs() {
    let convert = TaskId::new(TaskKind::Convert, Some(0), None);
    let node = TaskNode::new(TaskKind::Filter, Some(0), None)
      .with_param("mode", ParamValue::literal("strict"))
      .with_input("raw", OutputRef::new(convert.clone(), outputs::RAW));

    let produced = HashMap::from([(
      convert,
      TaskOutput::new().with(outputs::RAW, ArtifactRef::shard(0, "s0.raw")),
    )]);

    let params = resolve_params(&node, &produced).unwrap();
    assert_eq!(
      params["mode"],
      ResolvedParam::Literal(serde_json::json!("strict"))
    );
    assert_eq!(
      params["raw"],
      ResolvedParam::Artifact(ArtifactRef::shard(0, "s0.raw"))
    );
  }

  #[test]
  fn test_missing_output_is_an_error() {
    let convert = TaskId::new(TaskKind::Convert, Some(0), None);
    let node = TaskNode::new(TaskKind::Filter, Some(0), None)
      .with_input("raw", OutputRef::new(convert.clone(), outputs::RAW));
    let produced = HashMap::from([(convert, TaskOutput::new())]);

    let err = resolve_params(&node, &produced).unwrap_err();
    assert!(err.contains("shard0000/convert"));
  }

  #[test]
  fn test_shard_slots_list_every_branch() {
    let genotype = TaskId::new(TaskKind::Genotype, Some(1), None);
    let source = ShardSource {
      shard_index: 1,
      candidates: BTreeMap::from([(
        BranchTag::Flat,
        OutputRef::new(genotype.clone(), outputs::VCF),
      )]),
    };
    let node =
      TaskNode::new(TaskKind::GatherUnfiltered, None, None).with_shards("inputs", vec![source]);
    let produced = HashMap::from([(
      genotype,
      TaskOutput::new().with(outputs::VCF, ArtifactRef::shard(1, "s1.vcf")),
    )]);

    let params = resolve_params(&node, &produced).unwrap();
    let ResolvedParam::Shards(slots) = &params["inputs"] else {
      panic!("expected shard slots");
    };
    assert_eq!(slots.len(), 1);
    assert_eq!(
      slots[0].by_branch[&BranchTag::Flat],
      Some(ArtifactRef::shard(1, "s1.vcf"))
    );
    assert_eq!(slots[0].by_branch[&BranchTag::NestedScatter], None);
  }
}
