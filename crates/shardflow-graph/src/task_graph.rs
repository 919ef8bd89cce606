use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use shardflow_config::TaskKind;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{BranchTag, TaskId, TaskNode};

/// The concrete set of tasks for one run.
///
/// Nodes are stored in insertion order, which is always a valid topological
/// order: a node can only be inserted after all of its dependencies.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskGraph {
  nodes: Vec<TaskNode>,
  #[serde(skip)]
  index: HashMap<TaskId, usize>,
}

impl TaskGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert a node, enforcing the graph invariants.
  pub fn insert(&mut self, node: TaskNode) -> Result<&TaskNode, GraphError> {
    if self.index.contains_key(&node.id) {
      return Err(GraphError::DuplicateTask(node.id.to_string()));
    }

    for dependency in &node.dependencies {
      if !self.index.contains_key(dependency) {
        return Err(GraphError::UnknownDependency {
          task: node.id.to_string(),
          dependency: dependency.to_string(),
        });
      }
    }

    for param in node.params.values() {
      for reference in param.references() {
        if !node.dependencies.contains(&reference.task) {
          return Err(GraphError::UndeclaredReference {
            task: node.id.to_string(),
            referenced: reference.task.to_string(),
          });
        }
      }
    }

    let position = self.nodes.len();
    self.index.insert(node.id.clone(), position);
    self.nodes.push(node);
    Ok(&self.nodes[position])
  }

  /// Nodes in topological (insertion) order.
  pub fn nodes(&self) -> &[TaskNode] {
    &self.nodes
  }

  pub fn get(&self, task_id: &TaskId) -> Option<&TaskNode> {
    self.index.get(task_id).map(|&position| &self.nodes[position])
  }

  /// Topological position of a node.
  pub fn position(&self, task_id: &TaskId) -> Option<usize> {
    self.index.get(task_id).copied()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Build the adjacency view for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.nodes)
  }

  pub fn count_kind(&self, kind: TaskKind) -> usize {
    self.nodes.iter().filter(|node| node.kind == kind).count()
  }

  pub fn count_branch(&self, branch: BranchTag) -> usize {
    self
      .nodes
      .iter()
      .filter(|node| node.branch == Some(branch))
      .count()
  }

  /// Node counts per kind, for reporting.
  pub fn kind_histogram(&self) -> BTreeMap<TaskKind, usize> {
    let mut histogram = BTreeMap::new();
    for node in &self.nodes {
      *histogram.entry(node.kind).or_insert(0) += 1;
    }
    histogram
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::node::OutputRef;

  fn import(shard: usize) -> TaskNode {
    TaskNode::new(TaskKind::Import, Some(shard), None)
  }

  #[test]
  fn test_insert_in_dependency_order() {
    let mut graph = TaskGraph::new();
    graph.insert(import(0)).unwrap();
    let convert = TaskNode::new(TaskKind::Convert, Some(0), None)
      .with_input("workspace", OutputRef::new(TaskId::from("shard0000/import"), "workspace"));
    graph.insert(convert).unwrap();

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.position(&TaskId::from("shard0000/convert")), Some(1));
    assert_eq!(
      graph.get(&TaskId::from("shard0000/convert")).unwrap().dependencies,
      vec![TaskId::from("shard0000/import")]
    );
  }

  #[test]
  fn test_rejects_unknown_dependency() {
    let mut graph = TaskGraph::new();
    let convert =
      TaskNode::new(TaskKind::Convert, Some(0), None).depends_on(TaskId::from("shard0000/import"));

    let err = graph.insert(convert).unwrap_err();
    assert!(matches!(err, GraphError::UnknownDependency { .. }));
  }

  #[test]
  fn test_rejects_duplicate() {
    let mut graph = TaskGraph::new();
    graph.insert(import(0)).unwrap();
    assert!(matches!(
      graph.insert(import(0)),
      Err(GraphError::DuplicateTask(_))
    ));
  }

  #[test]
  fn test_rejects_undeclared_reference() {
    let mut graph = TaskGraph::new();
    graph.insert(import(0)).unwrap();
    let convert = TaskNode::new(TaskKind::Convert, Some(0), None).with_param(
      "workspace",
      crate::ParamValue::Output(OutputRef::new(TaskId::from("shard0000/import"), "workspace")),
    );

    assert!(matches!(
      graph.insert(convert),
      Err(GraphError::UndeclaredReference { .. })
    ));
  }

  #[test]
  fn test_descendants() {
    let mut graph = TaskGraph::new();
    graph.insert(import(0)).unwrap();
    graph.insert(import(1)).unwrap();
    graph
      .insert(
        TaskNode::new(TaskKind::Convert, Some(0), None)
          .depends_on(TaskId::from("shard0000/import")),
      )
      .unwrap();
    graph
      .insert(
        TaskNode::new(TaskKind::GatherRaw, None, None)
          .depends_on(TaskId::from("shard0000/convert"))
          .depends_on(TaskId::from("shard0001/import")),
      )
      .unwrap();

    let view = graph.graph();
    assert_eq!(
      view.descendants(&TaskId::from("shard0000/import")),
      vec![TaskId::from("shard0000/convert"), TaskId::from("gather_raw")]
    );
    assert_eq!(view.entry_points().len(), 2);
  }
}
