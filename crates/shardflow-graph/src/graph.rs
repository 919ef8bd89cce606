use std::collections::{HashMap, HashSet, VecDeque};

use crate::node::{TaskId, TaskNode};

/// Graph structure for traversal and analysis.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Adjacency list: task_id -> list of downstream task_ids.
  adjacency: HashMap<TaskId, Vec<TaskId>>,
  /// Tasks with no dependencies.
  entry_points: Vec<TaskId>,
}

impl Graph {
  /// Build the adjacency view from nodes, in insertion order.
  pub fn new(nodes: &[TaskNode]) -> Self {
    let mut adjacency: HashMap<TaskId, Vec<TaskId>> = HashMap::new();

    for node in nodes {
      adjacency.entry(node.id.clone()).or_default();
      for dependency in &node.dependencies {
        adjacency
          .entry(dependency.clone())
          .or_default()
          .push(node.id.clone());
      }
    }

    let entry_points = nodes
      .iter()
      .filter(|node| node.dependencies.is_empty())
      .map(|node| node.id.clone())
      .collect();

    Self {
      adjacency,
      entry_points,
    }
  }

  /// Tasks with no dependencies.
  pub fn entry_points(&self) -> &[TaskId] {
    &self.entry_points
  }

  /// Tasks that directly depend on the given task.
  pub fn downstream(&self, task_id: &TaskId) -> &[TaskId] {
    self
      .adjacency
      .get(task_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every task transitively downstream of the given task, breadth first.
  pub fn descendants(&self, task_id: &TaskId) -> Vec<TaskId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue: VecDeque<&TaskId> = self.downstream(task_id).iter().collect();

    while let Some(next) = queue.pop_front() {
      if seen.insert(next.clone()) {
        order.push(next.clone());
        queue.extend(self.downstream(next));
      }
    }

    order
  }
}
